//! Run progress events and an in-memory replayable feed.
//!
//! Each event is serialized once, stamped with a UTC `timestamp`, and appended
//! to its run's feed. Subscribers first receive everything published so far,
//! then live events until a terminal (`completed` or `error`) event closes the
//! feed.

use crate::error::Result;
use crate::repository::{RunId, RunStatus};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

fn upper_status<S: Serializer>(status: &RunStatus, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&status.as_str().to_uppercase())
}

/// A progress notification for one run, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Init {
        #[serde(serialize_with = "upper_status")]
        status: RunStatus,
        message: String,
        total: usize,
    },
    Progress {
        processed: usize,
        percent: f64,
    },
    Completed {
        #[serde(serialize_with = "upper_status")]
        status: RunStatus,
        percent: f64,
        spreadsheet_url: Option<String>,
        json_url: Option<String>,
        success_count: usize,
        failure_count: usize,
    },
    Error {
        #[serde(serialize_with = "upper_status")]
        status: RunStatus,
        message: String,
    },
}

impl PipelineEvent {
    pub fn init(total: usize) -> Self {
        PipelineEvent::Init {
            status: RunStatus::Running,
            message: format!("Loaded {total} records"),
            total,
        }
    }

    pub fn progress(processed: usize, percent: f64) -> Self {
        PipelineEvent::Progress { processed, percent }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PipelineEvent::Error {
            status: RunStatus::Failed,
            message: message.into(),
        }
    }

    /// Short name matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Init { .. } => "init",
            PipelineEvent::Progress { .. } => "progress",
            PipelineEvent::Completed { .. } => "completed",
            PipelineEvent::Error { .. } => "error",
        }
    }

    /// Returns true for events after which a run emits nothing else.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Completed { .. } | PipelineEvent::Error { .. })
    }
}

/// Publishes events for a run.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, run_id: &RunId, event: &PipelineEvent) -> Result<()>;
}

/// Serializes an event with an RFC 3339 UTC timestamp (microseconds, `Z`).
pub fn stamp(event: &PipelineEvent) -> Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let serde_json::Value::Object(ref mut fields) = value {
        fields.insert(
            "timestamp".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
    }
    Ok(value.to_string())
}

/// How long a finished run's events stay available for replay.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct Feed {
    history: Vec<String>,
    subscribers: Vec<mpsc::UnboundedSender<String>>,
    finished_at: Option<Instant>,
}

impl Feed {
    fn expired(&self, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|finished| finished.elapsed() >= retention)
    }
}

/// In-memory, per-run event log with replay and live tail.
///
/// A run's feed is dropped once its terminal event is older than the
/// retention window (one hour unless set with [`EventFeed::with_retention`]).
/// Expired feeds are evicted on publish and subscribe, or explicitly through
/// [`EventFeed::evict_expired`].
///
/// ```rust
/// use futures::StreamExt;
/// use row_guard::events::{EventFeed, EventPublisher, PipelineEvent};
/// use row_guard::repository::RunId;
///
/// # async fn example() -> row_guard::error::Result<()> {
/// let feed = EventFeed::new();
/// let run = RunId::from("run-1");
/// feed.publish(&run, &PipelineEvent::init(10)).await?;
/// feed.publish(&run, &PipelineEvent::error("boom")).await?;
///
/// let replay: Vec<String> = feed.subscribe(&run).await.collect().await;
/// assert_eq!(replay.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EventFeed {
    feeds: Arc<RwLock<HashMap<RunId, Feed>>>,
    retention: Duration,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self {
            feeds: Arc::default(),
            retention: DEFAULT_RETENTION,
        }
    }
}

fn evict(feeds: &mut HashMap<RunId, Feed>, retention: Duration) -> usize {
    let before = feeds.len();
    feeds.retain(|_, feed| !feed.expired(retention));
    before - feeds.len()
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Streams every stored event for the run, then live events until the run
    /// finishes. A finished run yields its replay only; an unknown or expired
    /// run yields nothing.
    pub async fn subscribe(&self, run_id: &RunId) -> BoxStream<'static, String> {
        let mut feeds = self.feeds.write().await;
        evict(&mut feeds, self.retention);
        let Some(feed) = feeds.get_mut(run_id) else {
            return stream::empty().boxed();
        };
        let replay = stream::iter(feed.history.clone());
        if feed.finished_at.is_some() {
            return replay.boxed();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        feed.subscribers.push(tx);
        replay
            .chain(stream::poll_fn(move |cx| rx.poll_recv(cx)))
            .boxed()
    }

    /// Stored events for the run, oldest first.
    pub async fn history(&self, run_id: &RunId) -> Vec<String> {
        self.feeds
            .read()
            .await
            .get(run_id)
            .filter(|feed| !feed.expired(self.retention))
            .map(|feed| feed.history.clone())
            .unwrap_or_default()
    }

    /// Drops a run's feed; open subscriptions end.
    pub async fn purge(&self, run_id: &RunId) -> bool {
        self.feeds.write().await.remove(run_id).is_some()
    }

    /// Drops every feed past the retention window and returns how many went.
    pub async fn evict_expired(&self) -> usize {
        let evicted = evict(&mut *self.feeds.write().await, self.retention);
        if evicted > 0 {
            debug!(evicted, "Evicted finished event feeds");
        }
        evicted
    }
}

#[async_trait]
impl EventPublisher for EventFeed {
    async fn publish(&self, run_id: &RunId, event: &PipelineEvent) -> Result<()> {
        let line = stamp(event)?;
        let mut feeds = self.feeds.write().await;
        evict(&mut feeds, self.retention);
        let feed = feeds.entry(run_id.clone()).or_default();

        feed.history.push(line.clone());
        feed.subscribers.retain(|tx| tx.send(line.clone()).is_ok());
        if event.is_terminal() {
            feed.finished_at.get_or_insert_with(Instant::now);
            feed.subscribers.clear();
        }
        debug!(run_id = %run_id, event = event.kind(), "Published event");
        Ok(())
    }
}
