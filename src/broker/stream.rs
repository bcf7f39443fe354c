//! Quote streaming.
//!
//! Adapters expose live quotes as a broadcast-backed stream fed by one
//! background poller per adapter instance. If the feed fails, the poller
//! backs off and resubscribes on its own; consumers just see a gap. Symbols
//! are delivered in arrival order per symbol; no cross-symbol ordering is
//! promised.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

use super::error::BrokerError;
use super::types::Quote;
use crate::resilience::{ClassifyError, RetryConfig};

/// Channel capacity for quote updates.
const QUOTE_CHANNEL_CAPACITY: usize = 1024;

/// Streaming configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Interval between quote polls.
    pub poll_interval: Duration,
    /// Backoff settings for resubscribing after feed failures.
    pub retry: RetryConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            retry: RetryConfig::default(),
        }
    }
}

/// Where the streamer gets its quotes from.
///
/// Implemented per adapter over its transport (REST snapshot polls, or the
/// simulator's synthetic walk).
#[async_trait]
pub trait QuoteSource: Send + Sync + 'static {
    /// Fetch current quotes for the given symbols.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, BrokerError>;
}

/// A live quote stream.
///
/// Unbounded and lazy; ends only when the owning adapter shuts down. Slow
/// consumers may miss intermediate quotes (the channel keeps the most recent
/// `1024`), which is the right behavior for market data.
pub struct QuoteStream {
    inner: BroadcastStream<Quote>,
}

impl Stream for QuoteStream {
    type Item = Quote;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(quote))) => return Poll::Ready(Some(quote)),
                // Lagged: the consumer fell behind; skip to the live edge.
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for QuoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteStream").finish_non_exhaustive()
    }
}

/// Background quote poller shared by all subscriptions of one adapter.
pub struct QuoteStreamer {
    source: Arc<dyn QuoteSource>,
    config: StreamConfig,
    symbols: Arc<Mutex<HashSet<String>>>,
    sender: broadcast::Sender<Quote>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl QuoteStreamer {
    /// Create a streamer over `source`. The poll task starts lazily on the
    /// first subscription.
    #[must_use]
    pub fn new(source: Arc<dyn QuoteSource>, config: StreamConfig) -> Self {
        let (sender, _) = broadcast::channel(QUOTE_CHANNEL_CAPACITY);
        Self {
            source,
            config,
            symbols: Arc::new(Mutex::new(HashSet::new())),
            sender,
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Add symbols to the subscription set and return a stream of updates.
    pub fn subscribe(&self, symbols: &[String]) -> QuoteStream {
        {
            let mut set = self.lock_symbols();
            for symbol in symbols {
                set.insert(symbol.clone());
            }
        }
        self.ensure_running();
        QuoteStream {
            inner: BroadcastStream::new(self.sender.subscribe()),
        }
    }

    /// Remove symbols from the subscription set.
    pub fn unsubscribe(&self, symbols: &[String]) {
        let mut set = self.lock_symbols();
        for symbol in symbols {
            set.remove(symbol);
        }
    }

    /// Currently subscribed symbols.
    #[must_use]
    pub fn subscribed(&self) -> Vec<String> {
        self.lock_symbols().iter().cloned().collect()
    }

    /// Stop the poll task. Streams end after this.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn ensure_running(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let source = Arc::clone(&self.source);
        let symbols = Arc::clone(&self.symbols);
        let sender = self.sender.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(poll_loop(source, symbols, sender, config, shutdown));
    }

    fn lock_symbols(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.symbols
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for QuoteStreamer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for QuoteStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteStreamer")
            .field("config", &self.config)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

async fn poll_loop(
    source: Arc<dyn QuoteSource>,
    symbols: Arc<Mutex<HashSet<String>>>,
    sender: broadcast::Sender<Quote>,
    config: StreamConfig,
    shutdown: CancellationToken,
) {
    let mut backoff = config.retry.initial_delay;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(config.poll_interval) => {}
        }

        let current: Vec<String> = {
            let set = symbols
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            set.iter().cloned().collect()
        };
        if current.is_empty() {
            continue;
        }

        match source.fetch_quotes(&current).await {
            Ok(quotes) => {
                backoff = config.retry.initial_delay;
                for quote in quotes {
                    // Send fails only when no subscriber is listening.
                    let _ = sender.send(quote);
                }
            }
            Err(error) if error.is_retryable() => {
                tracing::warn!(
                    error = %error,
                    backoff_ms = backoff.as_millis() as u64,
                    "Quote feed dropped, resubscribing"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * config.retry.multiplier)
                        .min(config.retry.max_delay.as_secs_f64()),
                );
            }
            Err(error) => {
                tracing::warn!(error = %error, "Quote poll failed");
            }
        }
    }
}
