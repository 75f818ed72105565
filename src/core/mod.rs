//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod rates;

// Re-export main types for cleaner imports
pub use cache::TtlCache;
pub use error::{ConversionError, ConversionResult};
pub use rates::{QuoteMap, QuoteSource};
