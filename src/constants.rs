/// Token mint addresses
pub mod mints {
    /// Wrapped SOL (native SOL wrapped as SPL token)
    pub const WSOL: &str = "So11111111111111111111111111111111111111112";
}

/// Program IDs
pub mod programs {
    /// Pump.fun bonding curve program
    pub const PUMP_FUN: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
    /// Pumpswap AMM (post-migration pools)
    pub const PUMPSWAP: &str = "BSfD6SHZigAfDWSjzD5Q41jw8LmKwtmjskPH9XW1mrRW";
    /// Raydium AMM v4
    pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
    /// Metaplex token metadata program
    pub const TOKEN_METADATA: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";
}

/// PDA seeds
pub mod seeds {
    pub const BONDING_CURVE: &[u8] = b"bonding-curve";
    pub const PUMPSWAP_POOL: &[u8] = b"pumpswap_pool";
    pub const METADATA: &[u8] = b"metadata";
}

/// Named filters carried in subscription requests
pub mod filters {
    pub const POOL_MONITOR: &str = "pool_monitor";
    pub const BONDING_CURVE_MONITOR: &str = "bonding_curve_monitor";
    pub const SWAP_MONITOR: &str = "swap_monitor";
    pub const SNIPER: &str = "sniper";
}

/// Base units per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Pump.fun tokens carry 6 decimals
pub const PUMP_TOKEN_DECIMALS: u32 = 6;

/// Decimals assumed when a balance record omits them
pub const DEFAULT_TOKEN_DECIMALS: u32 = 9;
