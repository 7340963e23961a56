//! Pool address derivation
//!
//! Maps a token mint to the on-chain address whose updates carry its price:
//! - Pump.fun: bonding curve PDA (`"bonding-curve"` + mint)
//! - Pumpswap: pool PDA (`"pumpswap_pool"` + mint)
//! - Raydium: no deterministic derivation, needs the pool id observed on-chain
//!
//! Derivation never fails outward. Anything that cannot be derived degrades
//! to a placeholder (the mint itself) flagged as unreliable.

use crate::constants::{mints, programs, seeds};
use crate::error::DerivationError;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

/// Supported exchange kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexKind {
    PumpFun,
    PumpSwap,
    Raydium,
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PumpFun => write!(f, "pumpfun"),
            Self::PumpSwap => write!(f, "pumpswap"),
            Self::Raydium => write!(f, "raydium"),
        }
    }
}

/// How a pool address was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationMethod {
    /// Program-derived address, computed offline
    Pda,
    /// Supplied by the caller from an on-chain observation
    Lookup,
    /// Best-effort stand-in; live subscription is unreliable
    Placeholder,
}

/// Result of a pool derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
    pub pool_address: String,
    pub dex: DexKind,
    pub token_mint: String,
    pub quote_mint: String,
    pub derivation_method: DerivationMethod,
}

impl PoolInfo {
    fn new(pool_address: String, dex: DexKind, mint: &str, method: DerivationMethod) -> Self {
        Self {
            pool_address,
            dex,
            token_mint: mint.to_string(),
            quote_mint: mints::WSOL.to_string(),
            derivation_method: method,
        }
    }

    fn placeholder(mint: &str, dex: DexKind) -> Self {
        Self::new(mint.to_string(), dex, mint, DerivationMethod::Placeholder)
    }
}

/// Derive the pool address for `mint` on `dex`
///
/// `pool_id` is only consulted for exchanges without a deterministic
/// derivation.
pub fn derive_pool_address(mint: &str, dex: DexKind, pool_id: Option<&str>) -> PoolInfo {
    let derived = match dex {
        DexKind::PumpFun => derive_bonding_curve(mint),
        DexKind::PumpSwap => derive_pumpswap_pool(mint),
        DexKind::Raydium => return derive_raydium_pool(mint, pool_id),
    };

    match derived {
        Ok(address) => PoolInfo::new(address.to_string(), dex, mint, DerivationMethod::Pda),
        Err(e) => {
            tracing::warn!(mint = %mint, dex = %dex, error = %e, "Pool derivation failed, using placeholder");
            PoolInfo::placeholder(mint, dex)
        }
    }
}

/// Pump.fun bonding curve PDA for `mint`
pub fn derive_bonding_curve(mint: &str) -> Result<Pubkey, DerivationError> {
    find_pda(seeds::BONDING_CURVE, mint, programs::PUMP_FUN)
}

/// Pumpswap pool PDA for `mint`
pub fn derive_pumpswap_pool(mint: &str) -> Result<Pubkey, DerivationError> {
    find_pda(seeds::PUMPSWAP_POOL, mint, programs::PUMPSWAP)
}

fn find_pda(seed: &[u8], mint: &str, program: &str) -> Result<Pubkey, DerivationError> {
    let mint_key = parse_pubkey(mint)?;
    let program_id = parse_pubkey(program)?;
    let (address, _bump) = Pubkey::find_program_address(&[seed, mint_key.as_ref()], &program_id);
    Ok(address)
}

fn derive_raydium_pool(mint: &str, pool_id: Option<&str>) -> PoolInfo {
    match pool_id.filter(|id| is_valid_address(id)) {
        Some(id) => PoolInfo::new(id.to_string(), DexKind::Raydium, mint, DerivationMethod::Lookup),
        None => {
            tracing::warn!(
                mint = %mint,
                "No Raydium pool id available, subscription will be unreliable"
            );
            PoolInfo::placeholder(mint, DexKind::Raydium)
        }
    }
}

/// True when the pool address can be trusted for a live subscription
pub fn is_reliable(info: &PoolInfo) -> bool {
    matches!(
        info.derivation_method,
        DerivationMethod::Pda | DerivationMethod::Lookup
    )
}

/// Guess which exchange produced a transaction from its log lines
pub fn detect_dex_from_logs<S: AsRef<str>>(logs: &[S]) -> Option<DexKind> {
    if any_log(logs, |l| {
        l.contains(programs::PUMP_FUN) || l.contains("Program log: Instruction: InitializeMint2")
    }) {
        return Some(DexKind::PumpFun);
    }
    if any_log(logs, |l| {
        l.contains(programs::RAYDIUM_AMM_V4) || l.contains("initialize2") || l.contains("InitializeInstruction")
    }) {
        return Some(DexKind::Raydium);
    }
    if any_log(logs, |l| l.contains(programs::PUMPSWAP)) {
        return Some(DexKind::PumpSwap);
    }
    None
}

fn any_log<S: AsRef<str>>(logs: &[S], pred: impl Fn(&str) -> bool) -> bool {
    logs.iter().any(|l| pred(l.as_ref()))
}

/// Pull a Raydium pool id out of `ray_log` / `Initialize2` log lines
pub fn extract_raydium_pool_from_logs<S: AsRef<str>>(logs: &[S]) -> Option<String> {
    for (i, log) in logs.iter().enumerate() {
        let log = log.as_ref();
        if log.contains("ray_log: ") {
            if let Some(rest) = log.split("pool:").nth(1) {
                if let Some(id) = first_address_token(rest) {
                    return Some(id);
                }
            }
        }
        if log.contains("Instruction: Initialize2") {
            if let Some(id) = logs.get(i + 1).and_then(|next| first_address_token(next.as_ref())) {
                return Some(id);
            }
        }
    }
    None
}

fn first_address_token(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .find(|word| word.len() >= 43 && is_valid_address(word))
        .map(str::to_string)
}

fn parse_pubkey(address: &str) -> Result<Pubkey, DerivationError> {
    Pubkey::from_str(address.trim()).map_err(|_| DerivationError::InvalidAddress(address.to_string()))
}

/// Base58 string decoding to exactly 32 bytes
pub fn is_valid_address(address: &str) -> bool {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return false;
    }
    matches!(bs58::decode(trimmed).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Keep only valid addresses, logging each rejected entry under `label`
pub fn validate_pubkeys<S: AsRef<str>>(keys: &[S], label: &str) -> Vec<String> {
    keys.iter()
        .enumerate()
        .filter_map(|(i, key)| {
            let key = key.as_ref().trim();
            if is_valid_address(key) {
                Some(key.to_string())
            } else {
                tracing::warn!(label = label, index = i, key = key, "Skipping invalid pubkey");
                None
            }
        })
        .collect()
}
