//! Wei helpers. Every amount inside the client is wei in a `u128`.

use rust_decimal::Decimal;

use crate::error::{PaperCatsError, Result};

const ETHER_DECIMALS: u32 = 18;

/// Parse a decimal wei string as handed out by wallets and contract reads.
/// An empty string counts as zero.
pub fn parse_wei(raw: &str) -> Result<u128> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u128>()
        .map_err(|e| PaperCatsError::InvalidAmount(format!("`{raw}` is not a wei amount: {e}")))
}

/// Human readable ether amount for log lines and error text.
pub fn format_ether(wei: u128) -> String {
    i128::try_from(wei)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, ETHER_DECIMALS).ok())
        .map(|d| format!("{} ETH", d.normalize()))
        .unwrap_or_else(|| format!("{wei} wei"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wei() {
        assert_eq!(parse_wei("1000000000000000000").unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(parse_wei("  42 ").unwrap(), 42);
        assert_eq!(parse_wei("").unwrap(), 0);
        assert!(matches!(parse_wei("0.5"), Err(PaperCatsError::InvalidAmount(_))));
        assert!(parse_wei("-1").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(1_000_000_000_000_000_000), "1 ETH");
        assert_eq!(format_ether(10_000_000_000_000_000), "0.01 ETH");
        assert_eq!(format_ether(0), "0 ETH");
    }
}
