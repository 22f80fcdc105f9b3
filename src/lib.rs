pub mod binance;
pub mod core;

pub use crate::binance::{BinanceClient, Params, Subscription};
pub use crate::core::config::ClientConfig;
pub use crate::core::errors::ClientError;
pub use crate::core::products::Product;
pub use crate::core::types::*;
