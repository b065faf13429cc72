//! REST depth snapshots for venues whose stream carries deltas only.
//!
//! [`RestSnapshotSource`] fills a URL template with the instrument, fetches
//! the depth document and expects it in the adapter snapshot shape:
//!
//! ```json
//! {"type": "snapshot", "venue": "KUCOIN", "symbol": "BTC-USDT", "sequence": 10,
//!  "bids": [{"price": "100", "quantity": "1"}], "asks": []}
//! ```

use std::sync::Arc;

use reqwest::Client;
use url::Url;

use crate::config::FeedConfig;
use crate::error::Error;
use crate::normalizer::Normalizer;
use crate::types::{Instrument, RawEvent, Snapshot};
use crate::Result;

use super::session::{SnapshotReply, SnapshotSource};

const PLACEHOLDERS: [&str; 3] = ["{symbol}", "{target}", "{base}"];

/// HTTP client for depth snapshots
///
/// The template may contain `{symbol}` (`BTC-USDT`), `{target}` and `{base}`.
///
/// # Example
///
/// ```rust
/// use venue_feed::config::FeedConfig;
/// use venue_feed::feed::RestSnapshotSource;
/// use venue_feed::types::{Instrument, Venue};
///
/// let source = RestSnapshotSource::new(
///     "https://relay.invalid/depth?symbol={symbol}",
///     &FeedConfig::new(),
/// )?;
/// let url = source.snapshot_url(&Instrument::new(Venue::Kucoin, "BTC", "USDT"))?;
/// assert_eq!(url.as_str(), "https://relay.invalid/depth?symbol=BTC-USDT");
/// # Ok::<(), venue_feed::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RestSnapshotSource {
    inner: Arc<RestInner>,
}

#[derive(Debug)]
struct RestInner {
    client: Client,
    url_template: String,
    normalizer: Normalizer,
}

impl RestSnapshotSource {
    /// Create a snapshot source
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the template names no instrument
    /// placeholder, or an error if the HTTP client cannot be initialized.
    pub fn new(url_template: impl Into<String>, config: &FeedConfig) -> Result<Self> {
        let url_template = url_template.into();
        if !PLACEHOLDERS.iter().any(|p| url_template.contains(p)) {
            return Err(Error::Config(format!(
                "snapshot URL template {:?} has no instrument placeholder",
                url_template
            )));
        }

        let client = Client::builder()
            .timeout(config.snapshot_timeout())
            .build()?;

        Ok(Self {
            inner: Arc::new(RestInner {
                client,
                url_template,
                normalizer: Normalizer::new(),
            }),
        })
    }

    /// Get the URL template
    pub fn url_template(&self) -> &str {
        &self.inner.url_template
    }

    /// URL of an instrument's snapshot
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the filled template is not a valid URL.
    pub fn snapshot_url(&self, instrument: &Instrument) -> Result<Url> {
        let url = self
            .inner
            .url_template
            .replace("{symbol}", &instrument.pair.to_string())
            .replace("{target}", instrument.target().symbol())
            .replace("{base}", instrument.base().symbol());
        Ok(Url::parse(&url)?)
    }

    /// Fetch one snapshot
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, an error status, or a body that
    /// is not a snapshot of the requested instrument.
    pub async fn fetch(&self, instrument: &Instrument) -> Result<Snapshot> {
        let url = self.snapshot_url(instrument)?;
        let response = self
            .inner
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { Error::Timeout } else { Error::Http(e) })?;
        let body = handle_response(response).await?;

        match self.inner.normalizer.normalize_payload(&body)? {
            Some(RawEvent::Snapshot(snapshot)) if &snapshot.instrument == instrument => Ok(snapshot),
            Some(RawEvent::Snapshot(snapshot)) => Err(Error::decode(
                Some(instrument.venue),
                format!("snapshot for {} requested for {}", snapshot.instrument, instrument),
            )),
            _ => Err(Error::decode(
                Some(instrument.venue),
                "snapshot endpoint returned a non-snapshot document",
            )),
        }
    }
}

impl SnapshotSource for RestSnapshotSource {
    fn request(&self, instrument: &Instrument, reply: SnapshotReply) {
        let source = self.clone();
        let instrument = instrument.clone();
        tokio::spawn(async move {
            match source.fetch(&instrument).await {
                Ok(snapshot) => {
                    reply.deliver(snapshot);
                }
                Err(error) => {
                    reply.failed(&error);
                }
            }
        });
    }
}

/// Check the HTTP status and return the body
async fn handle_response(response: reqwest::Response) -> Result<String> {
    let status = response.status();

    if status.as_u16() == 429 {
        let retry_after_ms = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000);

        return Err(Error::RateLimited { retry_after_ms });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .or_else(|| value.get("msg"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);

        return Err(Error::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;

    fn source(template: &str) -> RestSnapshotSource {
        RestSnapshotSource::new(template, &FeedConfig::new()).unwrap()
    }

    #[test]
    fn test_snapshot_url_placeholders() {
        let source = source("https://relay.invalid/{base}/{target}/depth");
        let url = source
            .snapshot_url(&Instrument::new(Venue::Binance, "eth", "usdt"))
            .unwrap();
        assert_eq!(url.as_str(), "https://relay.invalid/USDT/ETH/depth");
    }

    #[test]
    fn test_invalid_template() {
        let source = source("not a url {symbol}");
        let err = source
            .snapshot_url(&Instrument::new(Venue::Kucoin, "BTC", "USDT"))
            .unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_template_without_placeholder() {
        let err = RestSnapshotSource::new("https://relay.invalid/depth", &FeedConfig::new())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
