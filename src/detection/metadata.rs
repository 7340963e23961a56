//! Token metadata cache
//!
//! Name/symbol storage keyed by the Metaplex metadata PDA.
//! - Filled on demand by callers or incidentally from metadata account
//!   updates seen on the position stream
//! - Entries expire after one hour (metadata rarely changes)
//! - Bounded by an LRU capacity on top of the age limit

use crate::clock::SharedClock;
use crate::constants::{programs, seeds};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::num::NonZeroUsize;
use std::str::FromStr;

/// Default entry lifetime
pub const DEFAULT_MAX_AGE_MS: i64 = 60 * 60 * 1000;

/// Default LRU capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Metaplex account key for MetadataV1
pub const METADATA_V1_KEY: u8 = 4;

/// Shortest buffer treated as a metadata account (real ones are ~679 bytes)
pub const METADATA_MIN_LEN: usize = 300;

const NAME_FIELD_LEN: usize = 32;
const SYMBOL_FIELD_LEN: usize = 10;

/// Name and symbol of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

/// Cached metadata with its insertion time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedMetadata {
    pub name: String,
    pub symbol: String,
    pub cached_at_ms: i64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCacheStats {
    pub size: usize,
    /// Age of the oldest entry, zero when empty
    pub oldest_age_ms: i64,
}

/// Metadata PDA for `mint`: seeds `["metadata", program, mint]`
pub fn derive_metadata_pda(mint: &str) -> Option<Pubkey> {
    let mint = Pubkey::from_str(mint.trim()).ok()?;
    let program = Pubkey::from_str(programs::TOKEN_METADATA).ok()?;
    let (pda, _bump) =
        Pubkey::find_program_address(&[seeds::METADATA, program.as_ref(), mint.as_ref()], &program);
    Some(pda)
}

/// Whether an account payload looks like a Metaplex metadata account
pub fn is_metadata_account(data: &[u8]) -> bool {
    data.len() >= METADATA_MIN_LEN && data[0] == METADATA_V1_KEY
}

/// Parse name and symbol from a metadata account
///
/// Layout: key (1) | update authority (32) | mint (32) | name (u32 len +
/// 32 byte field) | symbol (u32 len + 10 byte field). Padding NULs and
/// whitespace are trimmed.
pub fn parse_metadata(data: &[u8]) -> Option<TokenMetadata> {
    let mut offset = 1 + 32 + 32;

    let name_len = read_u32(data, offset)? as usize;
    offset += 4;
    let name = read_str(data, offset, name_len.min(NAME_FIELD_LEN))?;
    offset += NAME_FIELD_LEN;

    let symbol_len = read_u32(data, offset)? as usize;
    offset += 4;
    let symbol = read_str(data, offset, symbol_len.min(SYMBOL_FIELD_LEN))?;

    Some(TokenMetadata { name, symbol })
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn read_str(data: &[u8], offset: usize, len: usize) -> Option<String> {
    let bytes = data.get(offset..offset + len)?;
    let text = String::from_utf8_lossy(bytes);
    Some(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string())
}

/// Age-bounded metadata cache keyed by metadata PDA
pub struct MetadataCache {
    cache: Mutex<LruCache<String, CachedMetadata>>,
    max_age_ms: i64,
    clock: SharedClock,
}

impl MetadataCache {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_limits(clock, DEFAULT_CAPACITY, DEFAULT_MAX_AGE_MS)
    }

    pub fn with_limits(clock: SharedClock, capacity: usize, max_age_ms: i64) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            max_age_ms,
            clock,
        }
    }

    /// Store metadata for `mint`; invalid mints are ignored
    pub fn set(&self, mint: &str, metadata: TokenMetadata) -> bool {
        let Some(pda) = derive_metadata_pda(mint) else {
            tracing::warn!(mint = %mint, "Cannot derive metadata PDA, not caching");
            return false;
        };
        self.insert(pda.to_string(), metadata);
        true
    }

    /// Parse a metadata account seen on a stream and store it under its address
    pub fn ingest_account(&self, pda: &str, data: &[u8]) -> Option<TokenMetadata> {
        let metadata = parse_metadata(data)?;
        self.insert(pda.to_string(), metadata.clone());
        Some(metadata)
    }

    fn insert(&self, key: String, metadata: TokenMetadata) {
        tracing::debug!(
            pda = %key,
            name = %metadata.name,
            symbol = %metadata.symbol,
            "Cached token metadata"
        );
        let entry = CachedMetadata {
            name: metadata.name,
            symbol: metadata.symbol,
            cached_at_ms: self.clock.now_ms(),
        };
        self.cache.lock().put(key, entry);
    }

    /// Metadata for `mint` if present and not expired
    pub fn get(&self, mint: &str) -> Option<CachedMetadata> {
        let key = derive_metadata_pda(mint)?.to_string();
        let now = self.clock.now_ms();
        let mut cache = self.cache.lock();

        let expired = match cache.get(&key) {
            Some(entry) if now - entry.cached_at_ms <= self.max_age_ms => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(&key);
            tracing::trace!(mint = %mint, "Metadata entry expired");
        }
        None
    }

    pub fn has(&self, mint: &str) -> bool {
        self.get(mint).is_some()
    }

    /// Drop expired entries; returns the number removed
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut cache = self.cache.lock();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| now - entry.cached_at_ms > self.max_age_ms)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        if !expired.is_empty() {
            tracing::debug!(removed = expired.len(), "Cleaned up expired metadata entries");
        }
        expired.len()
    }

    pub fn stats(&self) -> MetadataCacheStats {
        let now = self.clock.now_ms();
        let cache = self.cache.lock();
        let oldest = cache.iter().map(|(_, e)| e.cached_at_ms).min().unwrap_or(now);
        MetadataCacheStats {
            size: cache.len(),
            oldest_age_ms: now - oldest,
        }
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
        tracing::debug!("Metadata cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

/// Build a metadata account buffer (test and replay helper)
pub fn encode_metadata_account(mint: &Pubkey, name: &str, symbol: &str) -> Vec<u8> {
    let mut data = vec![METADATA_V1_KEY];
    data.extend_from_slice(&[0u8; 32]);
    data.extend_from_slice(mint.as_ref());
    for (text, field_len) in [(name, NAME_FIELD_LEN), (symbol, SYMBOL_FIELD_LEN)] {
        let mut field = text.as_bytes().to_vec();
        field.resize(field_len, 0);
        data.extend_from_slice(&(field_len as u32).to_le_bytes());
        data.extend_from_slice(&field);
    }
    data.resize(679, 0);
    data
}
