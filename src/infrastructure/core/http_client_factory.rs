use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates an HTTP client. With `max_retries > 0` transient failures
    /// (connect errors, 5xx, 429) are retried with exponential backoff.
    pub fn create_client(request_timeout: Duration, max_retries: u32) -> ClientWithMiddleware {
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(request_timeout)
            .connect_timeout(std::cmp::min(request_timeout, Duration::from_secs(10)))
            .build()
            .unwrap_or_else(|_| Client::new());

        let builder = ClientBuilder::new(client);
        if max_retries == 0 {
            return builder.build();
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        builder
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    /// Client for calls that must reach the brokerage at most once.
    pub fn create_non_retrying_client(request_timeout: Duration) -> ClientWithMiddleware {
        Self::create_client(request_timeout, 0)
    }
}
