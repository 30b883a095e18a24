//! In-process event publisher that decouples scraping from persistence.
//!
//! Scraping units hand every extracted record to the publisher as a
//! [`ScrapedEvent`]; a single background dispatch task delivers each event to
//! every registered [`Subscriber`] (file writer, API writer, ...).
//!
//! # Delivery Model
//!
//! | Property | Behavior |
//! |----------|----------|
//! | Capacity | Bounded queue ([`DEFAULT_CAPACITY`] events); `publish` waits while full |
//! | Ordering | Events in arrival order; subscribers in registration order |
//! | Isolation | None between subscribers: a slow one stalls the others for that event |
//! | Failures | Subscriber errors and panics are logged and counted, never propagated |
//! | Shutdown | [`EventPublisher::close`] rejects new events, then dispatches every queued or in-flight one |
//!
//! # Usage
//!
//! ```ignore
//! let publisher = EventPublisher::new();
//! publisher.subscribe(Arc::new(FileSink::new("output")));
//! let scheduler = scheduler.with_listener(Arc::new(publisher.handle()));
//! let report = scheduler.run(&codes, concurrent).await?;
//! publisher.wait_for_idle().await;
//! let stats = publisher.close().await;
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{BoxError, ScrapeError};
use crate::models::ScrapedEvent;
use crate::scrapers::ScrapeListener;

pub const DEFAULT_CAPACITY: usize = 100;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A consumer of scraped records.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn on_record_scraped(&self, event: &ScrapedEvent) -> Result<(), BoxError>;
}

/// Counters returned by [`EventPublisher::close`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events taken off the queue.
    pub events: usize,
    /// Successful subscriber invocations.
    pub deliveries: usize,
    /// Subscriber invocations that returned an error or panicked.
    pub failures: usize,
}

struct Shared {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    /// Published but not yet fully dispatched, including sends still
    /// waiting for queue space.
    pending: AtomicUsize,
    accepting: AtomicBool,
}

impl Shared {
    fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn send(&self, tx: &mpsc::Sender<ScrapedEvent>, event: ScrapedEvent) -> Result<(), ScrapeError> {
        // Count first: once `close` observes this, the drain waits for it.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ScrapeError::PublisherClosed);
        }
        if tx.send(event).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ScrapeError::PublisherClosed);
        }
        Ok(())
    }
}

/// Owner of the dispatch task. Dropping it without [`close`](Self::close)
/// still drains the queue in the background.
pub struct EventPublisher {
    tx: mpsc::Sender<ScrapedEvent>,
    shared: Arc<Shared>,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<DispatchStats>,
}

impl EventPublisher {
    /// Start a publisher with [`DEFAULT_CAPACITY`]. Must be called inside a
    /// Tokio runtime.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            subscribers: RwLock::new(Vec::new()),
            pending: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
        });
        let worker = tokio::spawn(dispatch_loop(rx, shutdown_rx, shared.clone()));
        debug!(capacity, "Event publisher started");

        Self {
            tx,
            shared,
            shutdown,
            worker,
        }
    }

    /// Register a subscriber. It receives every event dispatched from now on.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        info!(subscriber = subscriber.name(), "Subscriber registered");
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(subscriber);
    }

    /// Cloneable producer side, for handing to scraping units.
    pub fn handle(&self) -> PublisherHandle {
        PublisherHandle {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Events published but not yet delivered to every subscriber.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Wait until every published event has been dispatched.
    pub async fn wait_for_idle(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Stop accepting events, dispatch everything already queued or still
    /// waiting for queue space, and return the dispatch counters.
    #[instrument(level = "info", skip_all)]
    pub async fn close(self) -> DispatchStats {
        self.shared.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(());
        drop(self.tx);
        match self.worker.await {
            Ok(stats) => {
                info!(
                    events = stats.events,
                    deliveries = stats.deliveries,
                    failures = stats.failures,
                    "Event publisher closed"
                );
                stats
            }
            Err(e) => {
                error!(error = %e, "Dispatch task did not finish cleanly");
                DispatchStats::default()
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of an [`EventPublisher`].
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<ScrapedEvent>,
    shared: Arc<Shared>,
}

impl PublisherHandle {
    /// Enqueue an event, waiting while the queue is full.
    pub async fn publish(&self, event: ScrapedEvent) -> Result<(), ScrapeError> {
        self.shared.send(&self.tx, event).await
    }
}

#[async_trait]
impl ScrapeListener for PublisherHandle {
    async fn on_scraped(&self, event: ScrapedEvent) {
        let name = event.record.name.clone();
        if let Err(e) = self.publish(event).await {
            warn!(record = %name, error = %e, "Dropping scraped event");
        }
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<ScrapedEvent>,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) -> DispatchStats {
    let mut stats = DispatchStats::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = rx.recv() => match event {
                Some(event) => dispatch(&event, &shared, &mut stats).await,
                None => return stats,
            },
        }
    }

    // New publishes are already rejected; keep receiving until every
    // accepted one, including blocked senders, has been dispatched.
    let mut drained = 0usize;
    while shared.pending.load(Ordering::SeqCst) > 0 {
        let Some(event) = rx.recv().await else {
            break;
        };
        dispatch(&event, &shared, &mut stats).await;
        drained += 1;
    }
    debug!(drained, "Dispatch queue drained");
    stats
}

async fn dispatch(event: &ScrapedEvent, shared: &Shared, stats: &mut DispatchStats) {
    stats.events += 1;
    debug!(
        source = %event.source_code,
        url = %event.url,
        scrape_ms = event.duration.as_millis() as u64,
        scraped_at = %event.timestamp.to_rfc3339(),
        "Dispatching event"
    );
    for subscriber in shared.snapshot() {
        let delivery = AssertUnwindSafe(subscriber.on_record_scraped(event))
            .catch_unwind()
            .await;
        match delivery {
            Ok(Ok(())) => stats.deliveries += 1,
            Ok(Err(e)) => {
                stats.failures += 1;
                warn!(
                    subscriber = subscriber.name(),
                    record = %event.record.name,
                    error = %e,
                    "Subscriber failed"
                );
            }
            Err(_) => {
                stats.failures += 1;
                error!(
                    subscriber = subscriber.name(),
                    record = %event.record.name,
                    "Subscriber panicked"
                );
            }
        }
    }
    shared.pending.fetch_sub(1, Ordering::SeqCst);
}
