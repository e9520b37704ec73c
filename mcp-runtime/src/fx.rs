//! PLN to USD conversion backed by a single latest FX close.

use chrono::Utc;

use crate::providers::QuoteProvider;

/// Yahoo Finance FX ticker for PLN to USD.
const FX_SYMBOL: &str = "PLNUSD=X";

/// Convert a PLN amount string to USD at the latest available close.
///
/// Every outcome is a string: unparseable input and an empty quote series are
/// reported in the result text, and a provider failure never propagates.
pub async fn convert_pln_to_usd(provider: &dyn QuoteProvider, amount: &str) -> String {
    let Ok(pln_value) = amount.trim().parse::<f64>() else {
        return format!("Invalid amount '{amount}'. Please enter a number.");
    };

    let closes = match provider.latest_closes(FX_SYMBOL).await {
        Ok(closes) => closes,
        Err(err) => return format!("Rate lookup failed: {err}"),
    };

    let Some(rate) = closes.last().copied() else {
        return "Could not fetch the PLN to USD rate from the quote provider.".to_string();
    };

    let usd_value = pln_value * rate;
    let ts = Utc::now().format("%Y-%m-%d %H:%M UTC");
    format!(
        "{pln_value} PLN \u{2248} {usd_value:.2} USD\nExchange rate: 1 PLN = {rate:.6} USD (as of {ts})"
    )
}
