//! Cross-rate conversion between fiat currencies via their BTC quotes.

use crate::core::currency::pair_for_currency;
use crate::core::error::{ConversionError, ConversionResult};
use crate::core::rates::{QuoteMap, QuoteSource};
use std::sync::Arc;
use tracing::{debug, info};

pub struct FxConverter {
    source: Arc<dyn QuoteSource>,
}

impl FxConverter {
    pub fn new(source: Arc<dyn QuoteSource>) -> Self {
        FxConverter { source }
    }

    /// Trading pair quoting BTC in `code`, e.g. `USD` -> `BTCUSDT`.
    pub fn pair_for_currency(code: &str) -> String {
        pair_for_currency(code)
    }

    /// Converts `amount` of `from` into `to`.
    ///
    /// The amount is validated before anything else, so a same-currency
    /// conversion of a non-positive amount still fails. Same-currency
    /// conversions return `amount` exactly without fetching quotes.
    pub async fn convert(&self, from: &str, to: &str, amount: f64) -> ConversionResult<f64> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(ConversionError::InvalidAmount);
        }

        if from == to {
            return Ok(amount);
        }

        let rate = self.cross_rate(from, to).await?;
        let converted = amount * rate;

        info!(
            "Converted {} {} to {:.4} {} (rate: {:.6})",
            amount, from, converted, to, rate
        );
        Ok(converted)
    }

    /// Units of `to` per unit of `from`.
    pub async fn get_exchange_rate(&self, from: &str, to: &str) -> ConversionResult<f64> {
        if from == to {
            return Ok(1.0);
        }
        self.cross_rate(from, to).await
    }

    pub async fn supported_currencies(&self) -> Vec<String> {
        self.source.supported_currencies().await
    }

    async fn cross_rate(&self, from: &str, to: &str) -> ConversionResult<f64> {
        let quotes = self.source.get_quotes(false).await?;

        let from_rate = lookup(&quotes, from)?;
        let to_rate = lookup(&quotes, to)?;

        if [from_rate, to_rate].iter().any(|r| r.is_nan() || *r <= 0.0) {
            return Err(ConversionError::InvalidRates);
        }

        let rate = from_rate / to_rate;
        debug!(from, to, rate, "Computed cross rate");
        Ok(rate)
    }
}

fn lookup(quotes: &QuoteMap, code: &str) -> ConversionResult<f64> {
    quotes
        .get(&pair_for_currency(code))
        .copied()
        .ok_or_else(|| ConversionError::UnsupportedCurrency(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockQuoteSource {
        quotes: Option<QuoteMap>,
        call_count: AtomicUsize,
    }

    impl MockQuoteSource {
        fn with_quotes(quotes: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                quotes: Some(
                    quotes
                        .iter()
                        .map(|(pair, price)| (pair.to_string(), *price))
                        .collect(),
                ),
                call_count: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                quotes: None,
                call_count: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for MockQuoteSource {
        async fn get_quotes(&self, _force_refresh: bool) -> Result<QuoteMap> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.quotes
                .clone()
                .ok_or_else(|| anyhow!("No BTC rates could be fetched from Binance"))
        }

        async fn supported_currencies(&self) -> Vec<String> {
            vec!["GBP".to_string(), "USD".to_string()]
        }
    }

    fn standard_quotes() -> Arc<MockQuoteSource> {
        MockQuoteSource::with_quotes(&[
            ("BTCUSDT", 45000.0),
            ("BTCGBP", 35000.0),
            ("BTCEUR", 41000.0),
        ])
    }

    #[tokio::test]
    async fn test_convert_usd_to_gbp() {
        let converter = FxConverter::new(standard_quotes());
        let result = converter.convert("USD", "GBP", 1000.0).await.unwrap();
        let expected = 1000.0 * 45000.0 / 35000.0;
        assert!((result - expected).abs() < 1e-9);
        assert!((result - 1285.71).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_same_currency_skips_quote_source() {
        let source = standard_quotes();
        let converter = FxConverter::new(source.clone());

        for code in ["USD", "GBP", "XYZ"] {
            assert_eq!(converter.convert(code, code, 123.456).await.unwrap(), 123.456);
            assert_eq!(converter.get_exchange_rate(code, code).await.unwrap(), 1.0);
        }
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_convert_rejects_non_positive_amounts() {
        let source = standard_quotes();
        let converter = FxConverter::new(source.clone());

        for amount in [0.0, -5.0, f64::NAN] {
            let err = converter.convert("USD", "GBP", amount).await.unwrap_err();
            assert!(matches!(err, ConversionError::InvalidAmount));
        }

        // Checked before the same-currency shortcut
        let err = converter.convert("USD", "USD", -5.0).await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidAmount));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_currency_names_the_code() {
        let converter = FxConverter::new(standard_quotes());

        let err = converter.convert("XYZ", "GBP", 10.0).await.unwrap_err();
        assert_eq!(err.to_string(), "Currency XYZ not supported");

        let err = converter.convert("USD", "ABC", 10.0).await.unwrap_err();
        assert_eq!(err.to_string(), "Currency ABC not supported");

        let err = converter.get_exchange_rate("USD", "ABC").await.unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedCurrency(code) if code == "ABC"));
    }

    #[tokio::test]
    async fn test_invalid_rates_rejected() {
        let converter = FxConverter::new(MockQuoteSource::with_quotes(&[
            ("BTCUSDT", 45000.0),
            ("BTCGBP", 0.0),
            ("BTCEUR", -1.0),
            ("BTCJPY", f64::NAN),
        ]));

        let err = converter.convert("USD", "GBP", 10.0).await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidRates));

        let err = converter.convert("EUR", "USD", 10.0).await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidRates));

        let err = converter.get_exchange_rate("USD", "GBP").await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidRates));

        let err = converter.get_exchange_rate("JPY", "USD").await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidRates));
    }

    #[tokio::test]
    async fn test_rates_are_reciprocal() {
        let converter = FxConverter::new(standard_quotes());
        let codes = ["USD", "GBP", "EUR"];
        for a in codes {
            for b in codes {
                let ab = converter.get_exchange_rate(a, b).await.unwrap();
                let ba = converter.get_exchange_rate(b, a).await.unwrap();
                assert!((ab - 1.0 / ba).abs() < 1e-12, "{a}/{b}");
            }
        }
    }

    #[tokio::test]
    async fn test_convert_matches_exchange_rate() {
        let converter = FxConverter::new(standard_quotes());
        for amount in [0.01, 1.0, 1000.0, 12345.678] {
            let converted = converter.convert("EUR", "GBP", amount).await.unwrap();
            let rate = converter.get_exchange_rate("EUR", "GBP").await.unwrap();
            assert!((converted - amount * rate).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_source_failure_is_upstream_error() {
        let converter = FxConverter::new(MockQuoteSource::failing());
        let err = converter.convert("USD", "GBP", 10.0).await.unwrap_err();
        assert!(!err.is_client_error());
        assert!(matches!(err, ConversionError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_supported_currencies_delegates() {
        let converter = FxConverter::new(standard_quotes());
        assert_eq!(converter.supported_currencies().await, vec!["GBP", "USD"]);
    }

    #[test]
    fn test_pair_for_currency() {
        assert_eq!(FxConverter::pair_for_currency("USD"), "BTCUSDT");
        assert_eq!(FxConverter::pair_for_currency("GBP"), "BTCGBP");
    }
}
