//! Token discovery
//!
//! - `detector`: detection stream over a program or wallet allow-list
//! - `metadata`: token name/symbol cache fed from metadata accounts

pub mod detector;
pub mod metadata;

pub use detector::{mint_from_token_balances, DetectedToken, TokenCallback, TokenDetector};
pub use metadata::{
    derive_metadata_pda, is_metadata_account, parse_metadata, CachedMetadata, MetadataCache,
    MetadataCacheStats, TokenMetadata,
};
