//! Swap price extraction from transaction balance deltas
//!
//! A swap moves the traded token and WSOL in opposite directions. Their
//! pre/post token balance records give the executed price without decoding
//! any instruction data.

use crate::constants::{DEFAULT_TOKEN_DECIMALS, LAMPORTS_PER_SOL};
use crate::stream::update::{TokenBalance, TransactionUpdate};

/// Executed price of a swap for one monitored mint
#[derive(Debug, Clone, PartialEq)]
pub struct SwapPrice {
    pub mint: String,
    pub price_sol: f64,
    pub price_usd: f64,
    /// SOL side of the swap converted to USD, fed to the health monitor
    pub volume_usd: f64,
    pub token_delta: u128,
    pub sol_delta: u128,
    pub signature: String,
}

/// Direction and size of a token balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenFlow {
    pub is_sell: bool,
    pub token_delta: u128,
}

fn find<'a>(balances: &'a [TokenBalance], mint: &str) -> Option<&'a TokenBalance> {
    balances.iter().find(|b| b.mint == mint)
}

/// Extract the executed price for the first monitored mint the swap touched
///
/// Returns `None` when no monitored mint has both pre and post records
/// alongside WSOL records, or when either delta is zero.
pub fn extract_swap_price<'a, I>(
    tx: &TransactionUpdate,
    monitored_mints: I,
    wsol_mint: &str,
    sol_price_usd: f64,
) -> Option<SwapPrice>
where
    I: IntoIterator<Item = &'a str>,
{
    let pre_sol = find(&tx.pre_token_balances, wsol_mint)?;
    let post_sol = find(&tx.post_token_balances, wsol_mint)?;
    let sol_delta = pre_sol.raw_amount().abs_diff(post_sol.raw_amount());

    for mint in monitored_mints {
        let (Some(pre), Some(post)) = (
            find(&tx.pre_token_balances, mint),
            find(&tx.post_token_balances, mint),
        ) else {
            continue;
        };

        let token_delta = pre.raw_amount().abs_diff(post.raw_amount());
        if token_delta == 0 || sol_delta == 0 {
            continue;
        }

        let decimals = post
            .decimals
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS);

        let sol_amount = sol_delta as f64 / LAMPORTS_PER_SOL;
        let token_amount = token_delta as f64 / 10f64.powi(decimals as i32);
        let price_sol = sol_amount / token_amount;
        if !price_sol.is_finite() || price_sol <= 0.0 {
            continue;
        }

        return Some(SwapPrice {
            mint: mint.to_string(),
            price_sol,
            price_usd: price_sol * sol_price_usd,
            volume_usd: sol_amount * sol_price_usd,
            token_delta,
            sol_delta,
            signature: tx.signature.clone(),
        });
    }

    None
}

/// Token flow for `mint` in a transaction: post below pre is a sell
///
/// `None` when either balance record is missing.
pub fn token_flow(tx: &TransactionUpdate, mint: &str) -> Option<TokenFlow> {
    let pre = find(&tx.pre_token_balances, mint).filter(|b| b.has_amount())?;
    let post = find(&tx.post_token_balances, mint).filter(|b| b.has_amount())?;
    let (pre, post) = (pre.raw_amount(), post.raw_amount());
    Some(TokenFlow {
        is_sell: post < pre,
        token_delta: pre.abs_diff(post),
    })
}
