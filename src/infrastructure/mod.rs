pub mod alpaca;
pub mod core;
pub mod mock;

pub use mock::{MockBrokerage, MockPriceFeed};
