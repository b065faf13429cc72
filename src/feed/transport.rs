//! WebSocket transport for venue streams.
//!
//! [`VenueConnection`] is one live socket: it answers pings and yields text
//! frames. [`run_connection`] owns a connection for its whole life: it
//! subscribes the instruments, feeds decoded frames into a [`FeedSession`],
//! resubscribes books that desynchronized, and on loss resets the venue's
//! books, reconnects with exponential backoff and replays the subscriptions.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::adapter::FeedAdapter;
use crate::error::Error;
use crate::types::Instrument;
use crate::Result;

use super::session::FeedSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One WebSocket connection to a venue
#[derive(Debug)]
pub struct VenueConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl VenueConnection {
    /// Connect to a WebSocket endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(endpoint).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Send a text frame
    pub async fn send_text(&mut self, frame: String) -> Result<()> {
        self.write.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Receive the next text frame
    ///
    /// Pings are answered automatically; binary and pong frames are skipped.
    ///
    /// # Returns
    ///
    /// The next frame, or `None` if the stream ended.
    pub async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(_)) => return Some(Err(Error::ConnectionClosed)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.write.close().await?;
        Ok(())
    }
}

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (0 = infinite)
    pub max_retries: u32,
    /// Initial delay between reconnection attempts
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries (0 = infinite)
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay in milliseconds
    #[must_use]
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    #[must_use]
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculate delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_retries == 0 || attempt < self.max_retries
    }
}

/// Drive one venue connection until retries are exhausted.
///
/// Every decoded frame is handed to `session`. An instrument posted on the
/// venue's [`FeedSession::resubscribe_requests`] channel is unsubscribed and
/// subscribed again on the live socket, then reported through
/// [`FeedSession::instrument_resubscribed`]. When the socket drops, the
/// venue's books are reset via [`FeedSession::disconnect`]; once a new socket
/// is up and the instruments are subscribed again,
/// [`FeedSession::resubscribed`] is reported.
///
/// # Errors
///
/// Returns [`Error::ConnectionClosed`] once `reconnect.max_retries`
/// consecutive attempts failed.
pub async fn run_connection<A: FeedAdapter>(
    adapter: A,
    session: FeedSession,
    instruments: Vec<Instrument>,
    reconnect: ReconnectConfig,
) -> Result<()> {
    let venue = adapter.venue();
    let mut requests = session.resubscribe_requests(venue);
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        let mut connection = match open(&adapter, &instruments).await {
            Ok(connection) => connection,
            Err(error) => {
                if !reconnect.allows_attempt(attempt + 1) {
                    return Err(Error::ConnectionClosed);
                }
                let delay = reconnect.delay_for_attempt(attempt);
                warn!(%venue, %error, attempt, ?delay, "connect failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
        };

        info!(%venue, instruments = instruments.len(), "connected");
        if connected_before {
            session.resubscribed(venue);
        }
        connected_before = true;

        // The fresh subscription already covers anything asked for meanwhile.
        while let Ok(instrument) = requests.try_recv() {
            session.instrument_resubscribed(&instrument);
        }

        loop {
            let frame = tokio::select! {
                frame = connection.next_text() => frame,
                Some(instrument) = requests.recv() => {
                    if let Err(error) = resubscribe(&adapter, &mut connection, &instrument).await {
                        debug!(%venue, %instrument, %error, "resubscribe failed");
                        break;
                    }
                    info!(%venue, %instrument, "resubscribed");
                    session.instrument_resubscribed(&instrument);
                    continue;
                }
            };

            let text = match frame {
                Some(Ok(text)) => text,
                Some(Err(error)) => {
                    debug!(%venue, %error, "read failed");
                    break;
                }
                None => break,
            };
            // A frame got through, the connection is healthy.
            attempt = 0;

            match adapter.decode(&text) {
                Ok(messages) => {
                    for message in messages {
                        session.ingest(message);
                    }
                }
                Err(error) => session.record_decode_error(Some(venue), &error),
            }
        }

        if let Err(error) = connection.close().await {
            debug!(%venue, %error, "close failed");
        }
        session.disconnect(venue);

        if !reconnect.allows_attempt(attempt) {
            return Err(Error::ConnectionClosed);
        }
        let delay = reconnect.delay_for_attempt(attempt);
        warn!(%venue, attempt, ?delay, "connection lost, reconnecting");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

async fn open<A: FeedAdapter>(adapter: &A, instruments: &[Instrument]) -> Result<VenueConnection> {
    let mut connection = VenueConnection::connect(adapter.endpoint()).await?;
    for frame in adapter.subscribe_frames(instruments) {
        connection.send_text(frame).await?;
    }
    Ok(connection)
}

async fn resubscribe<A: FeedAdapter>(
    adapter: &A,
    connection: &mut VenueConnection,
    instrument: &Instrument,
) -> Result<()> {
    let instruments = std::slice::from_ref(instrument);
    let frames = adapter
        .unsubscribe_frames(instruments)
        .into_iter()
        .chain(adapter.subscribe_frames(instruments));
    for frame in frames {
        connection.send_text(frame).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.initial_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reconnect_config_builder() {
        let config = ReconnectConfig::new()
            .max_retries(5)
            .initial_delay_ms(50)
            .max_delay_ms(10_000)
            .backoff_multiplier(1.5);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 50);
        assert_eq!(config.max_delay_ms, 10_000);
        assert!((config.backoff_multiplier - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delay_calculation() {
        let config = ReconnectConfig::new()
            .initial_delay_ms(100)
            .backoff_multiplier(2.0)
            .max_delay_ms(1000);

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        // Capped at max_delay_ms
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_allows_attempt() {
        let limited = ReconnectConfig::new().max_retries(2);
        assert!(limited.allows_attempt(1));
        assert!(!limited.allows_attempt(2));

        let unlimited = ReconnectConfig::new().max_retries(0);
        assert!(unlimited.allows_attempt(u32::MAX));
    }
}
