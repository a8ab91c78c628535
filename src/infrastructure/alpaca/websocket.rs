//! Alpaca market data stream
//!
//! Implements the price stream ports over Alpaca's v2 data websocket:
//! `connected` → `auth` → `authenticated`, then `subscribe`/`unsubscribe`
//! messages for minute bars. Each bar's close becomes a [`PriceTick`].

use crate::domain::errors::DashboardError;
use crate::domain::market::price_tick::PriceTick;
use crate::domain::ports::{PriceStreamConnector, PriceStreamSession};
use crate::domain::trading::symbol::Symbol;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, error, info, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
pub(crate) enum AlpacaMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i32, msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "b")]
    Bar(AlpacaStreamBar),
    #[serde(rename = "u")]
    UpdatedBar(AlpacaStreamBar),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AlpacaStreamBar {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "t")]
    timestamp: Option<String>,
}

impl AlpacaStreamBar {
    fn into_tick(self) -> Option<PriceTick> {
        let symbol = Symbol::parse(&self.symbol).ok()?;
        let price = Decimal::from_f64(self.close)?;
        let observed_at = self
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        Some(PriceTick::new(symbol, price, observed_at))
    }
}

/// Parses one websocket text frame; Alpaca batches messages in arrays.
pub(crate) fn parse_frame(text: &str) -> Result<Vec<AlpacaMessage>, serde_json::Error> {
    serde_json::from_str::<Vec<AlpacaMessage>>(text)
}

/// Opens authenticated sessions against the Alpaca data stream.
pub struct AlpacaMarketStream {
    ws_url: String,
    api_key: String,
    api_secret: String,
}

impl AlpacaMarketStream {
    pub fn new(ws_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            ws_url,
            api_key,
            api_secret,
        }
    }

    async fn handshake(&self) -> Result<WsStream, DashboardError> {
        let (mut ws, _) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            DashboardError::remote(format!("Failed to connect to {}: {}", self.ws_url, e))
        })?;
        info!("AlpacaStream: Connected to {}", self.ws_url);

        let mut auth_sent = false;
        loop {
            let text = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(DashboardError::remote("stream closed during authentication"));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(DashboardError::remote(format!("handshake failed: {}", e)));
                }
            };

            let messages = parse_frame(text.as_str()).map_err(|e| {
                DashboardError::remote(format!("unexpected handshake message {}: {}", text, e))
            })?;

            for message in messages {
                match message {
                    AlpacaMessage::Success { msg } if msg == "connected" && !auth_sent => {
                        let auth = serde_json::json!({
                            "action": "auth",
                            "key": self.api_key,
                            "secret": self.api_secret,
                        });
                        send_text(&mut ws, auth.to_string()).await?;
                        auth_sent = true;
                        debug!("AlpacaStream: Auth sent");
                    }
                    AlpacaMessage::Success { msg } if msg == "authenticated" => {
                        info!("AlpacaStream: Authenticated");
                        return Ok(ws);
                    }
                    AlpacaMessage::Error { code, msg } => {
                        return Err(DashboardError::remote(format!(
                            "authentication rejected ({}): {}",
                            code, msg
                        )));
                    }
                    other => debug!("AlpacaStream: ignoring handshake message {:?}", other),
                }
            }
        }
    }
}

#[async_trait]
impl PriceStreamConnector for AlpacaMarketStream {
    async fn connect(&self) -> Result<Box<dyn PriceStreamSession>, DashboardError> {
        let ws = tokio::time::timeout(HANDSHAKE_TIMEOUT, self.handshake())
            .await
            .map_err(|_| {
                DashboardError::timeout("market data handshake", HANDSHAKE_TIMEOUT)
            })??;

        Ok(Box::new(AlpacaStreamSession {
            ws,
            frames: FrameBuffer::default(),
            closed: false,
        }))
    }
}

async fn send_text(ws: &mut WsStream, text: String) -> Result<(), DashboardError> {
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| DashboardError::interrupted(format!("failed to send to stream: {}", e)))
}

/// Ticks decoded from received frames, plus a remote error that ends the
/// session once the ticks queued ahead of it are delivered.
#[derive(Default)]
struct FrameBuffer {
    pending: VecDeque<PriceTick>,
    failure: Option<DashboardError>,
}

impl FrameBuffer {
    fn absorb(&mut self, text: &str) {
        let messages = match parse_frame(text) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("AlpacaStream: Unhandled message format ({}): {}", e, text);
                return;
            }
        };

        for message in messages {
            match message {
                AlpacaMessage::Bar(bar) | AlpacaMessage::UpdatedBar(bar) => {
                    match bar.into_tick() {
                        Some(tick) => self.pending.push_back(tick),
                        None => warn!("AlpacaStream: dropping unusable bar in {}", text),
                    }
                }
                AlpacaMessage::Subscription { bars } => {
                    info!("AlpacaStream: Subscribed bars: {:?}", bars);
                }
                AlpacaMessage::Error { code, msg } => {
                    error!("AlpacaStream: Alpaca error ({}): {}", code, msg);
                    self.failure = Some(DashboardError::interrupted(format!(
                        "Alpaca error ({}): {}",
                        code, msg
                    )));
                    return;
                }
                AlpacaMessage::Success { msg } => debug!("AlpacaStream: {}", msg),
                AlpacaMessage::Other => {}
            }
        }
    }

    fn next(&mut self) -> Option<Result<PriceTick, DashboardError>> {
        match self.pending.pop_front() {
            Some(tick) => Some(Ok(tick)),
            None => self.failure.take().map(Err),
        }
    }
}

struct AlpacaStreamSession {
    ws: WsStream,
    frames: FrameBuffer,
    closed: bool,
}

impl AlpacaStreamSession {
    async fn send_action(
        &mut self,
        action: &str,
        symbols: &[Symbol],
    ) -> Result<(), DashboardError> {
        let bars: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        let message = serde_json::json!({ "action": action, "bars": bars });
        send_text(&mut self.ws, message.to_string()).await?;
        info!("AlpacaStream: {} sent for {:?}", action, bars);
        Ok(())
    }
}

#[async_trait]
impl PriceStreamSession for AlpacaStreamSession {
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError> {
        self.send_action("subscribe", symbols).await
    }

    async fn unsubscribe(&mut self, symbols: &[Symbol]) -> Result<(), DashboardError> {
        self.send_action("unsubscribe", symbols).await
    }

    async fn next_tick(&mut self) -> Option<Result<PriceTick, DashboardError>> {
        loop {
            if let Some(next) = self.frames.next() {
                return Some(next);
            }
            if self.closed {
                return None;
            }

            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => self.frames.absorb(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    info!("AlpacaStream: Connection closed by server: {:?}", frame);
                    self.closed = true;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Some(Err(DashboardError::interrupted(format!(
                        "websocket error: {}",
                        e
                    ))));
                }
                None => {
                    warn!("AlpacaStream: Stream ended");
                    self.closed = true;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ws.close(None).await {
            debug!("AlpacaStream: close handshake failed: {}", e);
        }
    }
}
