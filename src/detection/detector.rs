//! New token detection stream
//!
//! Watches a program or wallet allow-list and reports tokens as they show up:
//! - Program mode: any transaction whose logs carry a configured
//!   discriminator is a creation, always reported as a buy
//! - Wallet mode: Buy/Sell instructions give the direction directly; Swap
//!   and SwapV2 compare the mint's pre and post balances
//!
//! The detector owns its own [`StreamSession`] and never shares state with
//! the position stream.

use crate::config::{DetectionConfig, DetectionMode, StreamTarget};
use crate::constants::filters;
use crate::error::StreamError;
use crate::pricing::token_flow;
use crate::stream::{
    detection_request, Commitment, SessionState, StreamSession, StreamUpdate, SubscriptionSource,
    Transport, TransactionUpdate, UpdateHandler, UpdatePayload,
};
use parking_lot::RwLock;
use std::sync::Arc;
use yellowstone_grpc_proto::prelude::SubscribeRequest;

const BUY_LOG: &str = "Program log: Instruction: Buy";
const SELL_LOG: &str = "Program log: Instruction: Sell";
const SWAP_LOG: &str = "Program log: Instruction: Swap";
const SWAP_V2_LOG: &str = "Program log: Instruction: SwapV2";

/// A token seen on the detection stream
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedToken {
    pub mint: String,
    pub is_sell: bool,
    /// The transaction the token was found in
    pub raw_transaction: TransactionUpdate,
}

/// Callback invoked for every detected token
pub type TokenCallback = Arc<dyn Fn(DetectedToken) + Send + Sync>;

/// Instruction kind recognized in wallet mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletInstruction {
    Buy,
    Sell,
    Swap,
}

fn wallet_instruction(logs: &[String]) -> Option<WalletInstruction> {
    let log = logs.iter().find(|log| {
        log.contains(SELL_LOG) || log.contains(BUY_LOG) || log.contains(SWAP_LOG) || log.contains(SWAP_V2_LOG)
    })?;

    if log.contains("Sell") {
        Some(WalletInstruction::Sell)
    } else if log.contains("Buy") {
        Some(WalletInstruction::Buy)
    } else {
        Some(WalletInstruction::Swap)
    }
}

/// First mint in the transaction's balances that is not the base asset
///
/// Post balances are used, falling back to pre balances when the post set
/// is empty.
pub fn mint_from_token_balances(tx: &TransactionUpdate, wsol_mint: &str) -> Option<String> {
    let balances = if tx.post_token_balances.is_empty() {
        &tx.pre_token_balances
    } else {
        &tx.post_token_balances
    };
    balances
        .iter()
        .find(|b| b.mint != wsol_mint && !b.mint.is_empty())
        .map(|b| b.mint.clone())
}

struct DetectorCore {
    settings: RwLock<DetectionConfig>,
    commitment: Commitment,
    callback: RwLock<Option<TokenCallback>>,
}

impl DetectorCore {
    fn classify(&self, tx: &TransactionUpdate) -> Option<DetectedToken> {
        if tx.post_token_balances.is_empty() && tx.pre_token_balances.is_empty() {
            return None;
        }

        let settings = self.settings.read();
        if settings.active_keys().is_empty() {
            return None;
        }

        let instruction = match settings.mode {
            DetectionMode::Program => {
                let matched = tx.log_messages.iter().any(|log| {
                    settings
                        .log_discriminators
                        .iter()
                        .any(|d| log.contains(d.as_str()))
                });
                if !matched {
                    return None;
                }
                None
            }
            DetectionMode::Wallet => Some(wallet_instruction(&tx.log_messages)?),
        };

        tracing::debug!(signature = %tx.signature, "New token instruction found");

        let Some(mint) = mint_from_token_balances(tx, &settings.wsol_mint) else {
            tracing::warn!(
                signature = %tx.signature,
                "No token mint could be extracted, continuing to watch the stream"
            );
            return None;
        };

        let is_sell = match instruction {
            None | Some(WalletInstruction::Buy) => false,
            Some(WalletInstruction::Sell) => true,
            Some(WalletInstruction::Swap) => match token_flow(tx, &mint) {
                Some(flow) => flow.is_sell,
                None => {
                    tracing::warn!(
                        mint = %mint,
                        signature = %tx.signature,
                        "Unable to determine token flow, swap balances missing"
                    );
                    return None;
                }
            },
        };

        Some(DetectedToken {
            mint,
            is_sell,
            raw_transaction: tx.clone(),
        })
    }
}

impl SubscriptionSource for DetectorCore {
    fn subscription_request(&self) -> Option<SubscribeRequest> {
        let keys = self.settings.read().active_keys();
        if keys.is_empty() {
            return None;
        }
        Some(detection_request(&keys, self.commitment))
    }
}

impl UpdateHandler for DetectorCore {
    fn handle_update(&self, update: StreamUpdate) {
        if !update.matches_filter(filters::SNIPER) {
            return;
        }
        let UpdatePayload::Transaction(tx) = &update.payload else {
            return;
        };
        let Some(token) = self.classify(tx) else {
            return;
        };

        tracing::info!(
            mint = %token.mint,
            is_sell = token.is_sell,
            signature = %token.raw_transaction.signature,
            "Token detected"
        );

        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(token);
        }
    }
}

/// Detection stream client
pub struct TokenDetector {
    core: Arc<DetectorCore>,
    session: Arc<StreamSession>,
}

impl TokenDetector {
    pub fn new(settings: DetectionConfig, commitment: Commitment, transport: Arc<dyn Transport>) -> Self {
        let policy = settings.reconnect.clone();
        let core = Arc::new(DetectorCore {
            settings: RwLock::new(settings),
            commitment,
            callback: RwLock::new(None),
        });
        let session = StreamSession::new("token-detection", transport, core.clone(), core.clone(), policy);
        Self { core, session }
    }

    /// Register the callback for detected tokens, replacing any previous one
    pub fn on_token_detected<F>(&self, callback: F)
    where
        F: Fn(DetectedToken) + Send + Sync + 'static,
    {
        *self.core.callback.write() = Some(Arc::new(callback));
    }

    pub async fn start(&self) -> Result<(), StreamError> {
        tracing::info!(mode = %self.core.settings.read().mode, "Starting token detection stream");
        self.session.start().await
    }

    pub async fn stop(&self) {
        self.session.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Replace the allow-lists and re-send the subscription on the live stream
    pub async fn set_allow_lists(
        &self,
        programs: Vec<StreamTarget>,
        wallets: Vec<StreamTarget>,
    ) -> Result<bool, StreamError> {
        {
            let mut settings = self.core.settings.write();
            settings.programs = programs;
            settings.wallets = wallets;
        }
        self.update_subscription().await
    }

    /// Re-send the current subscription without restarting the stream
    pub async fn update_subscription(&self) -> Result<bool, StreamError> {
        self.session.update_subscription().await
    }

    /// Classify a transaction without going through the stream
    pub fn classify(&self, tx: &TransactionUpdate) -> Option<DetectedToken> {
        self.core.classify(tx)
    }
}
