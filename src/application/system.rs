use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::account_query::AccountQueryService;
use crate::application::client::DashboardClient;
use crate::application::market_data::feed_client::MarketDataFeedClient;
use crate::application::market_data::live_price_store::LivePriceStore;
use crate::application::order_execution::OrderExecutionService;
use crate::config::{Config, Mode};
use crate::domain::ports::{AccountService, ExecutionService, PriceStreamConnector};
use crate::infrastructure::alpaca::{
    AlpacaAccountService, AlpacaExecutionService, AlpacaMarketStream, AlpacaRestClient,
};
use crate::infrastructure::core::HttpClientFactory;
use crate::infrastructure::mock::{MockBrokerage, MockPriceFeed};

const MOCK_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Brokerage adapters selected by `MODE`.
pub struct Services {
    pub account: Arc<dyn AccountService>,
    pub execution: Arc<dyn ExecutionService>,
    pub connector: Arc<dyn PriceStreamConnector>,
}

impl Services {
    pub fn from_config(config: &Config) -> (Self, Option<JoinHandle<()>>) {
        match config.mode {
            Mode::Mock => {
                info!("Using Mock services");
                let broker = Arc::new(MockBrokerage::demo());
                let feed = MockPriceFeed::new();
                let simulation = feed.spawn_simulation(MOCK_TICK_INTERVAL);
                let services = Self {
                    account: broker.clone(),
                    execution: broker,
                    connector: Arc::new(feed),
                };
                (services, Some(simulation))
            }
            Mode::Alpaca => {
                let alpaca = &config.alpaca;
                let dashboard = &config.dashboard;
                info!(
                    "Using Alpaca services ({}, {} feed)",
                    alpaca.base_url, alpaca.data_feed
                );

                let rest = |client| {
                    AlpacaRestClient::new(
                        client,
                        alpaca.api_key.clone(),
                        alpaca.secret_key.clone(),
                        alpaca.base_url.clone(),
                    )
                };
                // Queries are idempotent and may be retried; trading calls are sent once.
                let query_client = HttpClientFactory::create_client(
                    dashboard.request_timeout,
                    dashboard.max_retries,
                );
                let trading_client =
                    HttpClientFactory::create_non_retrying_client(dashboard.request_timeout);

                let services = Self {
                    account: Arc::new(AlpacaAccountService::new(rest(query_client))),
                    execution: Arc::new(AlpacaExecutionService::new(rest(trading_client))),
                    connector: Arc::new(AlpacaMarketStream::new(
                        alpaca.data_ws_url.clone(),
                        alpaca.api_key.clone(),
                        alpaca.secret_key.clone(),
                    )),
                };
                (services, None)
            }
        }
    }
}

/// Running dashboard: the client plus the background tasks it owns.
pub struct Dashboard {
    pub config: Config,
    pub client: DashboardClient,
    pub store: Arc<LivePriceStore>,
    simulation: Option<JoinHandle<()>>,
}

impl Dashboard {
    /// Wires the adapters for `config.mode` and starts the price feed.
    pub fn build(config: Config) -> Self {
        info!("Building livedash (Mode: {:?})...", config.mode);
        let (services, simulation) = Services::from_config(&config);
        let mut dashboard = Self::with_services(config, services);
        dashboard.simulation = simulation;
        dashboard
    }

    /// Must be called inside a tokio runtime; the feed task starts immediately.
    pub fn with_services(config: Config, services: Services) -> Self {
        let settings = &config.dashboard;
        let store = Arc::new(LivePriceStore::new());

        let feed = MarketDataFeedClient::start(
            services.connector,
            store.clone(),
            settings.symbols.clone(),
            settings.feed.clone(),
        );
        let client = DashboardClient::new(
            AccountQueryService::new(services.account, settings.request_timeout),
            OrderExecutionService::new(services.execution, settings.request_timeout),
            store.clone(),
            feed,
            settings.stale_after,
        )
        .with_history_defaults(settings.history_period, settings.history_timeframe);

        Self {
            config,
            client,
            store,
            simulation: None,
        }
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
        if let Some(simulation) = self.simulation {
            simulation.abort();
        }
        info!("livedash stopped");
    }
}
