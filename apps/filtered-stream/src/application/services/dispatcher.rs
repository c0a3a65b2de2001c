//! Stream Dispatcher
//!
//! Runs the per-connection delivery loop for every stream kind.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──(sink can flush)──► Streaming ──► Disconnected | Cancelled
//!      │
//!      └──(sink cannot flush)──► error, never registered
//! ```
//!
//! Each loop iteration waits for the next tick or cancellation, whichever
//! comes first. Store reads return owned snapshots, so matching and
//! serialization never run under a store lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, SinkError, StreamStore, UsageMeter, UsageRecord};
use crate::domain::connection::{ConnectionRegistry, Registration};
use crate::domain::content::{ContentItem, ContentLookup};
use crate::domain::rules::RuleMatcher;
use crate::domain::streaming::{
    CandidateCycle, DedupState, KEEP_ALIVE, StreamEnd, StreamEvent, StreamKind, StreamOutcome,
    clamp_delay,
};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Delivery loop tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Tick interval when the request gives none.
    pub default_delay_ms: u64,
    /// Upper bound for requested tick intervals.
    pub max_delay_ms: u64,
    /// Recent-window size for sample and firehose streams.
    pub recent_window: usize,
    /// Candidate snapshot refresh for sample and firehose streams.
    pub snapshot_refresh: Duration,
    /// Rule set refresh for search streams.
    pub rule_refresh: Duration,
    /// Language stream refresh while no candidate exists.
    pub language_empty_refresh: Duration,
    /// Language stream refresh once candidates exist.
    pub language_refresh: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 100,
            max_delay_ms: 10_000,
            recent_window: 10,
            snapshot_refresh: Duration::from_secs(5),
            rule_refresh: Duration::from_secs(2),
            language_empty_refresh: Duration::from_millis(500),
            language_refresh: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    /// Resolve a requested tick interval.
    #[must_use]
    pub fn delay(&self, requested_ms: Option<u64>) -> Duration {
        clamp_delay(requested_ms, self.default_delay_ms, self.max_delay_ms)
    }
}

// =============================================================================
// Session
// =============================================================================

/// One streaming request.
#[derive(Debug, Clone)]
pub struct StreamSession {
    /// Subscriber the stream belongs to.
    pub subscriber_id: String,
    /// What the stream delivers.
    pub kind: StreamKind,
    /// Request path, reported with usage.
    pub path: String,
    /// Tick interval.
    pub delay: Duration,
    /// Cancels the loop (client disconnect, close-all, shutdown).
    pub cancel: CancellationToken,
}

impl StreamSession {
    /// Create a session with a fresh cancellation token.
    #[must_use]
    pub fn new(
        subscriber_id: impl Into<String>,
        kind: StreamKind,
        path: impl Into<String>,
        delay: Duration,
    ) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            kind,
            path: path.into(),
            delay,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a specific cancellation token (e.g. a child of the server's).
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A registered session whose delivery loop has not started.
///
/// Dropping it without calling [`StreamDispatcher::deliver`] unregisters
/// the connection.
pub struct OpenedStream<K> {
    session: StreamSession,
    sink: K,
    registration: Registration,
    started_at: DateTime<Utc>,
}

impl<K> OpenedStream<K> {
    /// The allocated connection ID.
    #[must_use]
    pub fn connection_id(&self) -> &str {
        self.registration.connection_id()
    }

    /// Content created after this instant is eligible for search delivery.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[derive(Debug, Default)]
struct Progress {
    delivered: u64,
    keep_alives: u64,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs delivery loops against a content store.
pub struct StreamDispatcher<S> {
    store: Arc<S>,
    meter: Arc<dyn UsageMeter>,
    registry: Arc<ConnectionRegistry>,
    config: DispatcherConfig,
}

impl<S> std::fmt::Debug for StreamDispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: StreamStore + 'static> StreamDispatcher<S> {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        meter: Arc<dyn UsageMeter>,
        registry: Arc<ConnectionRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            meter,
            registry,
            config,
        }
    }

    /// Loop tuning.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The connection registry sessions are recorded in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The content store streams read from.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a session and fix its start time without running the loop.
    ///
    /// Called before the response is returned, so a stream is visible to
    /// `close_all` and sees content created after this call as soon as the
    /// caller holds the stream.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::FlushUnsupported`] if the sink cannot push lines
    /// incrementally; the session is never registered in that case.
    pub fn open<K: EventSink>(
        &self,
        session: StreamSession,
        sink: K,
    ) -> Result<OpenedStream<K>, SinkError> {
        if !sink.supports_flush() {
            tracing::warn!(
                subscriber_id = %session.subscriber_id,
                stream = %session.kind,
                "Sink cannot flush incrementally, refusing stream"
            );
            return Err(SinkError::FlushUnsupported);
        }

        let registration = self
            .registry
            .register(&session.subscriber_id, session.cancel.clone());
        metrics::set_active_connections(self.registry.total_connections());

        tracing::info!(
            subscriber_id = %session.subscriber_id,
            connection_id = %registration.connection_id(),
            stream = %session.kind,
            delay_ms = session.delay.as_millis(),
            "Stream opened"
        );

        Ok(OpenedStream {
            session,
            sink,
            registration,
            started_at: Utc::now(),
        })
    }

    /// Run an opened stream until it is cancelled or the sink fails.
    ///
    /// The connection is unregistered when this returns.
    pub async fn deliver<K: EventSink>(&self, stream: OpenedStream<K>) -> StreamOutcome {
        let OpenedStream {
            session,
            mut sink,
            registration,
            started_at,
        } = stream;

        let mut progress = Progress::default();
        let end = match session.kind {
            StreamKind::Search => {
                self.run_search(&session, started_at, &mut sink, &mut progress)
                    .await
            }
            _ => self.run_cycle(&session, &mut sink, &mut progress).await,
        };

        let connection_id = registration.connection_id().to_string();
        drop(registration);
        metrics::set_active_connections(self.registry.total_connections());

        let outcome = StreamOutcome {
            end,
            delivered: progress.delivered,
            keep_alives: progress.keep_alives,
        };

        tracing::info!(
            subscriber_id = %session.subscriber_id,
            connection_id = %connection_id,
            stream = %session.kind,
            end = ?outcome.end,
            delivered = outcome.delivered,
            keep_alives = outcome.keep_alives,
            "Stream closed"
        );

        outcome
    }

    /// Open a stream and run it to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::FlushUnsupported`] if the sink cannot push lines
    /// incrementally.
    pub async fn run<K: EventSink>(
        &self,
        session: StreamSession,
        sink: K,
    ) -> Result<StreamOutcome, SinkError> {
        let stream = self.open(session, sink)?;
        Ok(self.deliver(stream).await)
    }

    // =========================================================================
    // Search
    // =========================================================================

    async fn run_search<K: EventSink>(
        &self,
        session: &StreamSession,
        started: DateTime<Utc>,
        sink: &mut K,
        progress: &mut Progress,
    ) -> StreamEnd {
        let mut dedup = DedupState::for_kind(&session.kind, self.config.recent_window);
        let mut matcher = RuleMatcher::new(self.store.active_rules());
        let mut rules_fetched = Instant::now();
        let mut interval = ticker(session.delay);

        loop {
            tokio::select! {
                biased;
                () = session.cancel.cancelled() => return StreamEnd::Cancelled,
                _ = interval.tick() => {}
            }

            if rules_fetched.elapsed() >= self.config.rule_refresh {
                matcher = RuleMatcher::new(self.store.active_rules());
                rules_fetched = Instant::now();
                tracing::trace!(rules = matcher.len(), "Rules refreshed");
            }

            let events = self.search_tick(started, &matcher, &mut dedup);
            if events.is_empty() {
                if self.write_keep_alive(session, sink, progress).await.is_err() {
                    return write_failure_end(&session.cancel);
                }
                continue;
            }

            for event in events {
                if self.write_event(session, sink, event, progress).await.is_err() {
                    return write_failure_end(&session.cancel);
                }
            }
        }
    }

    /// Match content created since the stream opened and not yet delivered.
    fn search_tick(
        &self,
        started: DateTime<Utc>,
        matcher: &RuleMatcher,
        dedup: &mut DedupState,
    ) -> Vec<StreamEvent> {
        let timer = std::time::Instant::now();
        let lookup: &dyn ContentLookup = self.store.as_ref();
        let mut events = Vec::new();

        for item in self.store.content_created_after(started) {
            if dedup.is_duplicate(&item.id) {
                continue;
            }
            let Some(outcome) = matcher.match_outcome(&item, lookup) else {
                continue;
            };
            dedup.record(&item.id);
            let author = lookup.author(&item);
            events.push(StreamEvent::matched(outcome, author));
        }

        metrics::record_tick_matching(timer.elapsed());
        events
    }

    // =========================================================================
    // Sample / Firehose / Language
    // =========================================================================

    async fn run_cycle<K: EventSink>(
        &self,
        session: &StreamSession,
        sink: &mut K,
        progress: &mut Progress,
    ) -> StreamEnd {
        let mut rng = StdRng::from_os_rng();
        let mut dedup = DedupState::for_kind(&session.kind, self.config.recent_window);
        let mut cycle = CandidateCycle::new(self.candidates(&session.kind), &mut rng);
        let mut refreshed = Instant::now();
        let mut interval = ticker(session.delay);

        loop {
            tokio::select! {
                biased;
                () = session.cancel.cancelled() => return StreamEnd::Cancelled,
                _ = interval.tick() => {}
            }

            if refreshed.elapsed() >= self.refresh_cadence(&session.kind, cycle.is_empty()) {
                cycle.refresh(self.candidates(&session.kind), &mut rng);
                refreshed = Instant::now();
                tracing::trace!(stream = %session.kind, candidates = cycle.len(), "Candidates refreshed");
            }

            let next = cycle.next_eligible(&dedup).cloned();
            let written = match next {
                Some(item) => {
                    dedup.record(&item.id);
                    let author = self.store.author(&item);
                    let event = StreamEvent::unfiltered(item, author);
                    self.write_event(session, sink, event, progress).await
                }
                None => self.write_keep_alive(session, sink, progress).await,
            };

            if written.is_err() {
                return write_failure_end(&session.cancel);
            }
        }
    }

    fn candidates(&self, kind: &StreamKind) -> Vec<ContentItem> {
        match kind {
            StreamKind::Language(_) => self.store.content_filtered(&|item| kind.admits(item)),
            _ => self.store.all_content(),
        }
    }

    const fn refresh_cadence(&self, kind: &StreamKind, empty: bool) -> Duration {
        match kind {
            StreamKind::Language(_) if empty => self.config.language_empty_refresh,
            StreamKind::Language(_) => self.config.language_refresh,
            _ => self.config.snapshot_refresh,
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    async fn write_event<K: EventSink>(
        &self,
        session: &StreamSession,
        sink: &mut K,
        event: StreamEvent,
        progress: &mut Progress,
    ) -> Result<(), SinkError> {
        let line = match event.to_line() {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(content_id = %event.data.id, %error, "Failed to serialize event");
                return Ok(());
            }
        };
        let payload = line.trim_end().to_string();

        send_line(&session.cancel, sink, line).await?;

        progress.delivered += 1;
        metrics::record_event_delivered(&session.kind);
        self.report_usage(session, payload);
        Ok(())
    }

    async fn write_keep_alive<K: EventSink>(
        &self,
        session: &StreamSession,
        sink: &mut K,
        progress: &mut Progress,
    ) -> Result<(), SinkError> {
        send_line(&session.cancel, sink, KEEP_ALIVE.to_string()).await?;
        progress.keep_alives += 1;
        metrics::record_keep_alive(&session.kind);
        Ok(())
    }

    /// Report a delivery on a detached task; failures never reach the loop.
    fn report_usage(&self, session: &StreamSession, payload: String) {
        let meter = Arc::clone(&self.meter);
        let record = UsageRecord {
            subscriber_id: session.subscriber_id.clone(),
            method: "GET".to_string(),
            path: session.path.clone(),
            payload,
            status_code: 200,
            recorded_at: Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(error) = meter.report_usage(record).await {
                tracing::warn!(%error, "Usage report failed");
                metrics::record_usage_failure();
            }
        });
    }
}

/// Write one line unless the session is cancelled while the sink is full.
async fn send_line<K: EventSink>(
    cancel: &CancellationToken,
    sink: &mut K,
    line: String,
) -> Result<(), SinkError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SinkError::Closed),
        result = sink.send(line) => result,
    }
}

/// How a loop ended after a failed write.
fn write_failure_end(cancel: &CancellationToken) -> StreamEnd {
    if cancel.is_cancelled() {
        StreamEnd::Cancelled
    } else {
        StreamEnd::Disconnected
    }
}

fn ticker(delay: Duration) -> Interval {
    let mut interval = tokio::time::interval(delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

// =============================================================================
// Tests
// =============================================================================
