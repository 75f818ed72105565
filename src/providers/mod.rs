pub mod binance;

pub use binance::BinanceRateSource;
