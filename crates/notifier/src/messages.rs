//! Operator message templates (Telegram Markdown)

use std::time::Duration;

use piclaim_core::{Amount, BalanceId, TxHash};
use piclaim_ledger::ResultCodes;

/// Balance claimed and forwarded
pub fn claim_succeeded(amount: Amount, hash: &TxHash, explorer_tx_url: &str) -> String {
    format!(
        "✅ *Claim sent (sponsored)*\n*Amount:* {} Pi\n*Tx hash:* [{}...]({}{})",
        amount,
        hash.short(),
        explorer_tx_url,
        hash.to_hex()
    )
}

/// Ledger rejected the transaction. Always carries the result codes.
pub fn claim_rejected(balance_id: &BalanceId, amount: Amount, codes: &ResultCodes) -> String {
    format!(
        "❌ *Claim rejected*\n*Balance:* `{}`\n*Amount:* {} Pi\n*Result:* `{}`",
        balance_id.short(),
        amount,
        codes
    )
}

/// Transport or query failure; the next cycle retries from scratch
pub fn claim_failed(context: &str, cause: &str) -> String {
    format!("⚠️ *{}*\n```\n{}\n```", context, cause)
}

pub fn rate_limited(retry_after: Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(
            "⏳ *Rate limited by ledger service*\nBacking off for {}s",
            delay.as_secs()
        ),
        None => "⏳ *Rate limited by ledger service*\nBacking off".to_string(),
    }
}
