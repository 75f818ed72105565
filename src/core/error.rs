//! Conversion error types.

use thiserror::Error;

/// Errors returned by the conversion engine.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The requested amount was zero or negative.
    #[error("Amount must be greater than 0")]
    InvalidAmount,

    /// No quote is available for the given currency code.
    #[error("Currency {0} not supported")]
    UnsupportedCurrency(String),

    /// A looked-up quote was zero or negative.
    #[error("Invalid exchange rates received")]
    InvalidRates,

    /// Quotes could not be obtained from the rate source.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl ConversionError {
    /// True when the caller supplied bad input, false for server-side faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ConversionError::Upstream(_))
    }
}

pub type ConversionResult<T> = Result<T, ConversionError>;
