// Market data processing
pub mod market_data;

// Brokerage-facing services
pub mod account_query;
pub mod order_execution;

// Dashboard facade and wiring
pub mod client;
pub mod system;
