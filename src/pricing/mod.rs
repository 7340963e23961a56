//! Price computation from streamed data
//!
//! - `bonding_curve`: account decoder for Pump.fun curves
//! - `transaction`: executed price from swap balance deltas
//! - `sol_price`: cached SOL/USD conversion rate

pub mod bonding_curve;
pub mod sol_price;
pub mod transaction;

pub use bonding_curve::{decode_price_sol, BondingCurveState};
pub use sol_price::{SolPriceCache, SolPriceSource};
pub use transaction::{extract_swap_price, token_flow, SwapPrice, TokenFlow};
