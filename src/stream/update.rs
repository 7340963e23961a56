//! Transport-neutral mirror of streamed ledger updates
//!
//! Only the fields the monitors read are kept. Conversions from the
//! Yellowstone protobuf types live here so nothing else touches the wire
//! structs.

use yellowstone_grpc_proto::prelude as ysp;
use yellowstone_grpc_proto::prelude::subscribe_update::UpdateOneof;

/// One update received on a subscription stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    /// Names of the request filters this update matched
    pub filters: Vec<String>,
    pub payload: UpdatePayload,
}

impl StreamUpdate {
    pub fn matches_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|f| f == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Transaction(TransactionUpdate),
    Account(AccountUpdate),
    /// Pings, slots and anything else the monitors ignore
    Other,
}

/// Token balance record from transaction metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    pub owner: String,
    /// Raw amount in base units, as sent on the wire
    pub amount: String,
    pub decimals: Option<u32>,
}

impl TokenBalance {
    /// Raw amount parsed as an integer; missing or malformed reads as zero
    pub fn raw_amount(&self) -> u128 {
        self.amount.trim().parse().unwrap_or(0)
    }

    pub fn has_amount(&self) -> bool {
        !self.amount.trim().is_empty()
    }
}

/// Executed transaction with the metadata the monitors need
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionUpdate {
    /// Base58 signature
    pub signature: String,
    pub slot: u64,
    pub account_keys: Vec<String>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

/// Account write
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountUpdate {
    /// Base58 account address
    pub pubkey: String,
    /// Base58 owner program
    pub owner: String,
    pub lamports: u64,
    pub data: Vec<u8>,
    pub slot: u64,
}

impl From<ysp::SubscribeUpdate> for StreamUpdate {
    fn from(value: ysp::SubscribeUpdate) -> Self {
        let payload = match value.update_oneof {
            Some(UpdateOneof::Transaction(tx)) => UpdatePayload::Transaction(tx.into()),
            Some(UpdateOneof::Account(account)) => UpdatePayload::Account(account.into()),
            _ => UpdatePayload::Other,
        };
        Self {
            filters: value.filters,
            payload,
        }
    }
}

impl From<ysp::SubscribeUpdateTransaction> for TransactionUpdate {
    fn from(value: ysp::SubscribeUpdateTransaction) -> Self {
        let slot = value.slot;
        let Some(info) = value.transaction else {
            return Self {
                slot,
                ..Default::default()
            };
        };

        let account_keys = info
            .transaction
            .as_ref()
            .and_then(|tx| tx.message.as_ref())
            .map(|message| message.account_keys.iter().map(|key| encode_key(key)).collect())
            .unwrap_or_default();

        let (log_messages, pre_token_balances, post_token_balances) = info
            .meta
            .map(|meta| {
                (
                    meta.log_messages,
                    meta.pre_token_balances.into_iter().map(TokenBalance::from).collect(),
                    meta.post_token_balances.into_iter().map(TokenBalance::from).collect(),
                )
            })
            .unwrap_or_default();

        Self {
            signature: encode_key(&info.signature),
            slot,
            account_keys,
            log_messages,
            pre_token_balances,
            post_token_balances,
        }
    }
}

impl From<ysp::TokenBalance> for TokenBalance {
    fn from(value: ysp::TokenBalance) -> Self {
        let (amount, decimals) = value
            .ui_token_amount
            .map(|ui| (ui.amount, Some(ui.decimals)))
            .unwrap_or_default();
        Self {
            account_index: value.account_index,
            mint: value.mint,
            owner: value.owner,
            amount,
            decimals,
        }
    }
}

impl From<ysp::SubscribeUpdateAccount> for AccountUpdate {
    fn from(value: ysp::SubscribeUpdateAccount) -> Self {
        let info = value.account.unwrap_or_default();
        Self {
            pubkey: encode_key(&info.pubkey),
            owner: encode_key(&info.owner),
            lamports: info.lamports,
            data: info.data,
            slot: value.slot,
        }
    }
}

fn encode_key(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}
