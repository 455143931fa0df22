//! Big-integer to display-number conversions

use ethers::types::U256;
use ethers::utils::format_units;

/// Mantissa used by rate contracts (1e18)
pub const ETH_MANTISSA: f64 = 1e18;

/// Convert an on-chain integer amount to a float with `decimals` decimals
pub fn bn_to_number(value: U256, decimals: u32) -> f64 {
    format_units(value, decimals)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse a decimal integer string (e.g. an indexer `delta`) as a token amount
pub fn parse_integer_amount(raw: &str, decimals: u32) -> Option<f64> {
    let value = U256::from_dec_str(raw.trim()).ok()?;
    Some(bn_to_number(value, decimals))
}

/// `"1.2345678900 DOLA"`: ten decimals for positive balances, two otherwise
pub fn format_balance(balance: U256, decimals: u32, symbol: &str) -> String {
    let amount = bn_to_number(balance, decimals);
    let precision = if balance > U256::zero() { 10 } else { 2 };
    format!("{:.*} {}", precision, amount, symbol).trim().to_string()
}

/// Compact display with k/M/B suffixes
pub fn shorten_number(value: f64, precision: usize) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "k")
    } else {
        (value, "")
    };
    format!("{:.*}{}", precision, scaled, suffix)
}
