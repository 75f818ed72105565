//! Mapping between display currency codes and BTC trading pairs

/// Reference asset every fiat pair is quoted against.
pub const BASE_ASSET: &str = "BTC";

/// Exchange-side suffix used in place of the US Dollar.
const STABLECOIN: &str = "USDT";
const STABLECOIN_DISPLAY: &str = "USD";

/// Candidate pairs checked against the exchange, in preference order.
pub const DEFAULT_PAIRS: &[&str] = &[
    // G7
    "BTCUSDT", "BTCEUR", "BTCGBP", "BTCJPY", "BTCCAD",
    // Other developed markets
    "BTCAUD", "BTCCHF", "BTCSEK", "BTCNOK", "BTCDKK",
    // Emerging markets
    "BTCPLN", "BTCZAR", "BTCBRL", "BTCRUB", "BTCINR", "BTCKRW", "BTCMXN", "BTCTRY",
];

pub fn default_pairs() -> Vec<String> {
    DEFAULT_PAIRS.iter().map(|p| p.to_string()).collect()
}

/// Maps a display code such as `USD` to its trading pair, `BTCUSDT`.
pub fn pair_for_currency(code: &str) -> String {
    let suffix = match code {
        STABLECOIN_DISPLAY => STABLECOIN,
        other => other,
    };
    format!("{BASE_ASSET}{suffix}")
}

/// Maps a trading pair back to its display code.
///
/// Returns an empty string when the pair is not quoted against [`BASE_ASSET`]
/// or is too short to carry a currency suffix.
pub fn currency_for_pair(pair: &str) -> String {
    match pair.strip_prefix(BASE_ASSET) {
        Some(suffix) if pair.len() >= BASE_ASSET.len() + 3 => match suffix {
            STABLECOIN => STABLECOIN_DISPLAY.to_string(),
            other => other.to_string(),
        },
        _ => String::new(),
    }
}
