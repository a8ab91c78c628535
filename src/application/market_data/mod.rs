// Market data processing modules
pub mod feed_client;
pub mod live_price_store;

pub use feed_client::{FeedSettings, FeedState, MarketDataFeedClient};
pub use live_price_store::{LivePrice, LivePriceStore, PriceSnapshot};
