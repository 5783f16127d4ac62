use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    errors::{FeedError, FeedResult},
    market_maker::MarketState,
    types::{decode_message, FeedEvent, Topics},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Consecutive failed sessions tolerated before giving up.
    pub max_attempts: u32,
    /// A session that streamed market data at least this long before failing starts a
    /// fresh outage.
    pub reset_after: Duration,
}

impl ExponentialBackoff {
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(600),
            multiplier: 2.0,
            max_attempts: 5,
            reset_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub symbol: String,
    pub order_book_levels: u32,
    pub ping_interval: Duration,
    pub read_timeout: Duration,
}

impl FeedConfig {
    pub fn topics(&self) -> Topics {
        Topics::new(&self.symbol, self.order_book_levels)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.bybit.com/v5/public/linear".to_string(),
            symbol: "BTCUSDT".to_string(),
            order_book_levels: 50,
            ping_interval: Duration::from_secs(20),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a session ended, and how much market data it delivered first.
#[derive(Debug)]
pub struct SessionError {
    /// Market events applied before the failure.
    pub events: u64,
    /// Time from the first market event to the failure.
    pub streamed_for: Duration,
    pub source: FeedError,
}

impl SessionError {
    pub fn before_streaming(source: impl Into<FeedError>) -> Self {
        Self {
            events: 0,
            streamed_for: Duration::ZERO,
            source: source.into(),
        }
    }

    pub fn after_streaming(
        source: impl Into<FeedError>,
        events: u64,
        streamed_for: Duration,
    ) -> Self {
        Self {
            events,
            streamed_for,
            source: source.into(),
        }
    }

    /// Whether the session delivered data for at least `min` before it failed.
    pub fn streamed_at_least(&self, min: Duration) -> bool {
        self.events > 0 && self.streamed_for >= min
    }
}

/// One connect, subscribe and stream attempt against the exchange.
#[async_trait]
pub trait FeedSession: Send {
    /// Streams updates into `state` until the connection fails or `token` is cancelled.
    /// `Ok(())` means the session stopped because of cancellation.
    async fn run_session(
        &mut self,
        state: &MarketState,
        token: &CancellationToken,
    ) -> Result<(), SessionError>;
}

/// Runs sessions until cancelled, backing off between failures.
///
/// Every failure sleeps the current delay and then grows it. Once `max_attempts`
/// consecutive failures have been slept through the feed is declared dead. Only a
/// session that streamed market data for `reset_after` starts a fresh outage, resetting
/// delay and count; connections dropped sooner keep counting towards the limit.
pub async fn run_feed<S>(
    session: &mut S,
    state: &MarketState,
    backoff: &ExponentialBackoff,
    token: &CancellationToken,
) -> FeedResult<()>
where
    S: FeedSession + ?Sized,
{
    let mut delay = backoff.initial;
    let mut failures: u32 = 0;

    loop {
        if token.is_cancelled() {
            return Ok(());
        }
        let err = match session.run_session(state, token).await {
            Ok(()) => {
                tracing::info!("feed stopped");
                return Ok(());
            }
            Err(err) => err,
        };

        if err.streamed_at_least(backoff.reset_after) {
            delay = backoff.initial;
            failures = 0;
        }
        tracing::warn!(
            error = %err.source,
            events = err.events,
            streamed_secs = err.streamed_for.as_secs_f64(),
            attempt = failures + 1,
            max_attempts = backoff.max_attempts,
            ?delay,
            "feed session failed, reconnecting"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            _ = sleep(delay) => {}
        }
        delay = backoff.next_delay(delay);
        failures += 1;

        if failures >= backoff.max_attempts {
            tracing::error!(
                attempts = failures,
                "max reconnection attempts reached, giving up"
            );
            return Err(FeedError::ReconnectExhausted(backoff.max_attempts));
        }
    }
}

/// Applies a decoded update to the shared statistics.
pub fn apply_event(state: &MarketState, event: FeedEvent) {
    match event {
        FeedEvent::Ticker { bid1, ask1 } => state.update_ticker(bid1, ask1),
        FeedEvent::Trade { price } => state.update_trade(price),
        FeedEvent::OrderBook { bids, asks } => state.update_orderbook(&bids, &asks),
    }
}

#[derive(Debug, Default)]
struct StreamProgress {
    events: u64,
    first_event: Option<Instant>,
}

impl StreamProgress {
    fn record(&mut self) {
        self.events += 1;
        self.first_event.get_or_insert_with(Instant::now);
    }

    fn fail(&self, source: impl Into<FeedError>) -> SessionError {
        let streamed_for = self
            .first_event
            .map(|first| first.elapsed())
            .unwrap_or_default();
        SessionError::after_streaming(source, self.events, streamed_for)
    }
}

/// Bybit v5 public stream over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct BybitSession {
    config: FeedConfig,
    url: Url,
    topics: Topics,
}

impl BybitSession {
    pub fn new(config: FeedConfig) -> FeedResult<Self> {
        let url = Url::parse(&config.url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(FeedError::UnsupportedScheme(other.to_string())),
        }
        let topics = config.topics();
        Ok(Self {
            config,
            url,
            topics,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Handles one text frame and reports whether it carried a market event. Only a
    /// rejected subscription ends the session.
    fn handle_text(&self, text: &str, state: &MarketState) -> FeedResult<bool> {
        match decode_message(text, &self.topics) {
            Ok(Some(event)) => {
                apply_event(state, event);
                return Ok(true);
            }
            Ok(None) => {}
            Err(err @ FeedError::SubscriptionRejected(_)) => return Err(err),
            Err(err) => tracing::warn!(error = %err, "dropping undecodable feed message"),
        }
        Ok(false)
    }

    /// A rejected subscription counts as never having streamed, whatever came before.
    fn on_text(
        &self,
        text: &str,
        state: &MarketState,
        progress: &mut StreamProgress,
    ) -> Result<(), SessionError> {
        if self
            .handle_text(text, state)
            .map_err(SessionError::before_streaming)?
        {
            progress.record();
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSession for BybitSession {
    async fn run_session(
        &mut self,
        state: &MarketState,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(SessionError::before_streaming)?;
        tracing::info!(url = %self.url, "feed connected");

        let (mut write, mut read) = stream.split();
        for topic in self.topics.all() {
            let request = json!({ "op": "subscribe", "args": [topic] });
            write
                .send(Message::Text(request.to_string()))
                .await
                .map_err(SessionError::before_streaming)?;
        }
        tracing::info!(topics = ?self.topics.all(), "feed subscribed");

        let read_timeout = self.config.read_timeout;
        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.tick().await;
        let mut deadline = Instant::now() + read_timeout;
        let mut progress = StreamProgress::default();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let _ = write.close().await;
                    return Ok(());
                }
                _ = sleep_until(deadline) => {
                    return Err(progress.fail(FeedError::Stalled(read_timeout)));
                }
                _ = ping.tick() => {
                    let ping_request = json!({ "op": "ping" });
                    write
                        .send(Message::Text(ping_request.to_string()))
                        .await
                        .map_err(|err| progress.fail(err))?;
                }
                message = read.next() => {
                    deadline = Instant::now() + read_timeout;
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.on_text(&text, state, &mut progress)?
                        }
                        Some(Ok(Message::Binary(binary))) => {
                            match String::from_utf8(binary) {
                                Ok(text) => self.on_text(&text, state, &mut progress)?,
                                Err(_) => tracing::warn!("dropping non-utf8 binary frame"),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            write
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|err| progress.fail(err))?;
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame.map(|frame| frame.reason.into_owned());
                            return Err(progress.fail(FeedError::Closed(reason)));
                        }
                        Some(Err(err)) => return Err(progress.fail(err)),
                        None => return Err(progress.fail(FeedError::Closed(None))),
                    }
                }
            }
        }
    }
}
