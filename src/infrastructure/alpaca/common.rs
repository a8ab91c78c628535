use crate::domain::errors::DashboardError;
use reqwest::{Method, Response};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use url::Url;

pub(crate) const KEY_HEADER: &str = "APCA-API-KEY-ID";
pub(crate) const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Authenticated access to the Alpaca trading REST API.
#[derive(Clone)]
pub struct AlpacaRestClient {
    client: ClientWithMiddleware,
    api_key: String,
    api_secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaErrorBody {
    message: String,
}

impl AlpacaRestClient {
    pub fn new(
        client: ClientWithMiddleware,
        api_key: String,
        api_secret: String,
        base_url: String,
    ) -> Self {
        Self {
            client,
            api_key,
            api_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn endpoint(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Url, DashboardError> {
        let raw = format!("{}{}", self.base_url, path);
        let parsed = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        parsed.map_err(|e| DashboardError::remote(format!("invalid brokerage URL {}: {}", raw, e)))
    }

    /// `{collection}/{id}` with `id` percent-encoded as a single path segment.
    pub(crate) fn resource(&self, collection: &str, id: &str) -> Result<Url, DashboardError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(DashboardError::validation(format!("invalid resource id '{}'", id)));
        }
        let mut url = self.endpoint(collection, &[])?;
        url.path_segments_mut()
            .map_err(|_| {
                DashboardError::remote(format!("brokerage URL {} has no path", self.base_url))
            })?
            .push(id);
        Ok(url)
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(KEY_HEADER, &self.api_key)
            .header(SECRET_HEADER, &self.api_secret)
    }

    /// Sends the request; non-2xx answers become `RemoteService` errors
    /// carrying Alpaca's own message.
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Response, DashboardError> {
        let response = request
            .send()
            .await
            .map_err(|e| DashboardError::remote(format!("{} failed: {}", operation, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(DashboardError::remote_with_status(
            status,
            remote_message(status, &body),
        ))
    }

    pub(crate) async fn decode<T: DeserializeOwned>(
        response: Response,
        operation: &str,
    ) -> Result<T, DashboardError> {
        let text = response.text().await.map_err(|e| {
            DashboardError::remote(format!("Failed to read {} response: {}", operation, e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            DashboardError::remote(format!(
                "Failed to decode {} response: {}. Body: {}",
                operation, e, text
            ))
        })
    }
}

/// Extracts the human-readable message from an Alpaca error body.
pub(crate) fn remote_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<AlpacaErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => body.trim().to_string(),
    }
}

/// Alpaca encodes money and quantities as decimal strings.
pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, DashboardError> {
    Decimal::from_str(value).map_err(|e| {
        DashboardError::remote(format!("malformed {} '{}' from brokerage: {}", field, value, e))
    })
}
