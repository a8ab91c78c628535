pub mod price_tick;
pub mod timeframe;
