//! Pump.fun bonding curve account decoder
//!
//! Account layout (all integers little-endian):
//!
//! | Offset | Size | Field                   |
//! |--------|------|-------------------------|
//! | 0      | 8    | Anchor discriminator    |
//! | 8      | 8    | virtual_token_reserves  |
//! | 16     | 8    | virtual_sol_reserves    |
//! | 24     | 8    | real_token_reserves     |
//! | 32     | 8    | real_sol_reserves       |
//! | 40     | 8    | token_total_supply      |
//! | 48     | 1    | complete                |
//!
//! Accounts may carry trailing fields (creator etc.); only the first 49
//! bytes are read.

use crate::constants::{LAMPORTS_PER_SOL, PUMP_TOKEN_DECIMALS};

/// Minimum account length the decoder accepts
pub const BONDING_CURVE_MIN_LEN: usize = 49;

/// Accepted price band in SOL per whole token
pub const MIN_PRICE_SOL: f64 = 1e-10;
pub const MAX_PRICE_SOL: f64 = 1000.0;

mod offsets {
    pub const VIRTUAL_TOKEN_RESERVES: usize = 8;
    pub const VIRTUAL_SOL_RESERVES: usize = 16;
    pub const REAL_TOKEN_RESERVES: usize = 24;
    pub const REAL_SOL_RESERVES: usize = 32;
    pub const TOKEN_TOTAL_SUPPLY: usize = 40;
    pub const COMPLETE: usize = 48;
}

/// Decoded bonding curve reserves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

impl BondingCurveState {
    /// Decode a raw account buffer, `None` when it is too short
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < BONDING_CURVE_MIN_LEN {
            return None;
        }

        Some(Self {
            virtual_token_reserves: read_u64(data, offsets::VIRTUAL_TOKEN_RESERVES)?,
            virtual_sol_reserves: read_u64(data, offsets::VIRTUAL_SOL_RESERVES)?,
            real_token_reserves: read_u64(data, offsets::REAL_TOKEN_RESERVES)?,
            real_sol_reserves: read_u64(data, offsets::REAL_SOL_RESERVES)?,
            token_total_supply: read_u64(data, offsets::TOKEN_TOTAL_SUPPLY)?,
            complete: data[offsets::COMPLETE] != 0,
        })
    }

    /// Spot price in SOL per whole token
    ///
    /// `None` for an empty curve or a price outside the realistic band.
    pub fn price_sol(&self) -> Option<f64> {
        if self.virtual_token_reserves == 0 || self.virtual_sol_reserves == 0 {
            return None;
        }

        let sol = self.virtual_sol_reserves as f64 / LAMPORTS_PER_SOL;
        let tokens = self.virtual_token_reserves as f64 / 10f64.powi(PUMP_TOKEN_DECIMALS as i32);
        let price = sol / tokens;

        if !price.is_finite() || !(MIN_PRICE_SOL..=MAX_PRICE_SOL).contains(&price) {
            tracing::debug!(
                price_sol = price,
                virtual_sol = self.virtual_sol_reserves,
                virtual_tokens = self.virtual_token_reserves,
                "Rejecting unrealistic bonding curve price"
            );
            return None;
        }

        Some(price)
    }
}

/// Decode and price in one step
pub fn decode_price_sol(data: &[u8]) -> Option<f64> {
    BondingCurveState::decode(data)?.price_sol()
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Encode a curve state into a minimal account buffer
pub fn encode(state: &BondingCurveState) -> Vec<u8> {
    let mut data = vec![0u8; BONDING_CURVE_MIN_LEN];
    let fields = [
        (offsets::VIRTUAL_TOKEN_RESERVES, state.virtual_token_reserves),
        (offsets::VIRTUAL_SOL_RESERVES, state.virtual_sol_reserves),
        (offsets::REAL_TOKEN_RESERVES, state.real_token_reserves),
        (offsets::REAL_SOL_RESERVES, state.real_sol_reserves),
        (offsets::TOKEN_TOTAL_SUPPLY, state.token_total_supply),
    ];
    for (offset, value) in fields {
        data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
    data[offsets::COMPLETE] = u8::from(state.complete);
    data
}
