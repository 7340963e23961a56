//! Subscription request builders
//!
//! Position stream: account filters for pools and bonding curves plus a
//! transaction filter on the pools. Detection stream: one transaction
//! filter on the program or wallet allow-list. Both request the fastest
//! commitment tier.

use crate::constants::filters;
use crate::derivation::validate_pubkeys;
use serde::Deserialize;
use std::collections::HashMap;
use yellowstone_grpc_proto::prelude::{
    CommitmentLevel, SubscribeRequest, SubscribeRequestFilterAccounts,
    SubscribeRequestFilterTransactions,
};

/// Commitment tier requested from the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentLevel {
    fn from(value: Commitment) -> Self {
        match value {
            Commitment::Processed => CommitmentLevel::Processed,
            Commitment::Confirmed => CommitmentLevel::Confirmed,
            Commitment::Finalized => CommitmentLevel::Finalized,
        }
    }
}

fn account_filter(addresses: Vec<String>) -> SubscribeRequestFilterAccounts {
    SubscribeRequestFilterAccounts {
        account: addresses,
        ..Default::default()
    }
}

fn transaction_filter(account_include: Vec<String>) -> SubscribeRequestFilterTransactions {
    SubscribeRequestFilterTransactions {
        vote: Some(false),
        failed: Some(false),
        account_include,
        ..Default::default()
    }
}

/// Request for the position stream
///
/// Invalid addresses are dropped. A filter is only present when at least one
/// of its addresses survives validation; an empty address list would match
/// every account or transaction on the chain.
pub fn position_request(
    pool_addresses: &[String],
    bonding_curves: &[String],
    commitment: Commitment,
) -> SubscribeRequest {
    let pools = validate_pubkeys(pool_addresses, "pool");
    let curves = validate_pubkeys(bonding_curves, "bondingCurve");

    let mut accounts = HashMap::new();
    let mut transactions = HashMap::new();
    if !pools.is_empty() {
        accounts.insert(filters::POOL_MONITOR.to_string(), account_filter(pools.clone()));
        transactions.insert(filters::SWAP_MONITOR.to_string(), transaction_filter(pools));
    }
    if !curves.is_empty() {
        accounts.insert(filters::BONDING_CURVE_MONITOR.to_string(), account_filter(curves));
    }

    SubscribeRequest {
        accounts,
        transactions,
        commitment: Some(CommitmentLevel::from(commitment) as i32),
        ..Default::default()
    }
}

/// Request for the detection stream
pub fn detection_request(include_keys: &[String], commitment: Commitment) -> SubscribeRequest {
    let keys = validate_pubkeys(include_keys, "detection");

    let mut transactions = HashMap::new();
    transactions.insert(filters::SNIPER.to_string(), transaction_filter(keys));

    SubscribeRequest {
        transactions,
        commitment: Some(CommitmentLevel::from(commitment) as i32),
        ..Default::default()
    }
}
