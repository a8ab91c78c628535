pub mod account;
pub mod common;
pub mod execution;
pub mod websocket;

pub use account::AlpacaAccountService;
pub use common::AlpacaRestClient;
pub use execution::AlpacaExecutionService;
pub use websocket::AlpacaMarketStream;
