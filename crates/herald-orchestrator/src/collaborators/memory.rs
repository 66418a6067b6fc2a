//! In-memory collaborator implementations.
//!
//! Nothing here survives a restart. Useful for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::{EscalationVerdict, NotificationHistory, ResultsStore, StateStore};
use crate::error::Result;
use crate::task::{Task, TaskType};

/// Maximum number of samples returned with an escalation verdict.
const MAX_SAMPLES: usize = 5;

/// Windows longer than this are clamped (about a century).
const MAX_WINDOW_HOURS: u64 = 1_000_000;

/// Records kept by [`MemoryNotificationHistory::new`].
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 10_000;

/// One notification that was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Target the notification was about.
    pub target_id: String,
    /// Notification category (`build_failure`, `item_updated`, ...).
    pub category: String,
    /// Message text.
    pub message: String,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
}

/// Notification history kept in memory. The oldest record is evicted when full.
#[derive(Debug)]
pub struct MemoryNotificationHistory {
    records: Mutex<VecDeque<NotificationRecord>>,
    capacity: usize,
}

impl Default for MemoryNotificationHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NOTIFICATION_CAPACITY)
    }
}

impl MemoryNotificationHistory {
    /// Creates an empty history with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history holding at most `capacity` records (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self { records: Mutex::new(VecDeque::new()), capacity: capacity.max(1) }
    }

    /// Maximum number of retained records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records a notification sent now.
    pub async fn record(&self, target_id: &str, category: &str, message: impl Into<String>) {
        self.record_at(target_id, category, message, Utc::now()).await;
    }

    /// Records a notification sent at `sent_at`.
    pub async fn record_at(
        &self,
        target_id: &str,
        category: &str,
        message: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) {
        let mut records = self.records.lock().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(NotificationRecord {
            target_id: target_id.to_string(),
            category: category.to_string(),
            message: message.into(),
            sent_at,
        });
    }

    /// All records for a target, oldest first.
    pub async fn records_for(&self, target_id: &str) -> Vec<NotificationRecord> {
        self.records.lock().await.iter().filter(|r| r.target_id == target_id).cloned().collect()
    }

    /// Total number of records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn window_start(window_hours: u64) -> DateTime<Utc> {
    let hours = window_hours.min(MAX_WINDOW_HOURS) as i64;
    Utc::now() - Duration::hours(hours)
}

#[async_trait]
impl NotificationHistory for MemoryNotificationHistory {
    async fn is_recent_for_target(&self, target_id: &str, window_hours: u64) -> Result<bool> {
        let since = window_start(window_hours);
        let records = self.records.lock().await;
        Ok(records.iter().any(|r| r.target_id == target_id && r.sent_at >= since))
    }

    async fn should_escalate(
        &self,
        target_id: &str,
        category: &str,
        threshold: u32,
        window_hours: u64,
    ) -> Result<EscalationVerdict> {
        let since = window_start(window_hours);
        let records = self.records.lock().await;
        let mut matching: Vec<&NotificationRecord> = records
            .iter()
            .filter(|r| r.target_id == target_id && r.category == category && r.sent_at >= since)
            .collect();
        matching.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        let count = u32::try_from(matching.len()).unwrap_or(u32::MAX);
        Ok(EscalationVerdict {
            escalate: threshold > 0 && count >= threshold,
            count,
            recent_samples: matching.iter().take(MAX_SAMPLES).map(|r| r.message.clone()).collect(),
        })
    }
}

/// Results store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryResultsStore {
    records: Mutex<HashMap<String, Value>>,
    histories: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryResultsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record stored under `key`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.records.lock().await.get(key).cloned()
    }

    /// Summaries appended under `history_key`, oldest first.
    pub async fn history(&self, history_key: &str) -> Vec<Value> {
        self.histories.lock().await.get(history_key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ResultsStore for MemoryResultsStore {
    async fn store(&self, key: &str, record: Value) -> Result<()> {
        self.records.lock().await.insert(key.to_string(), record);
        Ok(())
    }

    async fn append(&self, history_key: &str, summary: Value) -> Result<()> {
        self.histories.lock().await.entry(history_key.to_string()).or_default().push(summary);
        Ok(())
    }
}

/// Last known state of one tracked target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedState {
    /// Latest state or result reported for the target.
    pub state: Option<String>,
    /// Task that reported it.
    pub task_id: String,
    /// When it was reported.
    pub updated_at: DateTime<Utc>,
}

/// Tracked work item, build and pull request state kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    tracked: Mutex<HashMap<String, TrackedState>>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked state for a kind (`item`, `build`, `pr`) and target.
    pub async fn get(&self, kind: &str, target_id: &str) -> Option<TrackedState> {
        self.tracked.lock().await.get(&format!("{kind}:{target_id}")).cloned()
    }
}

fn tracked_kind(task_type: TaskType) -> Option<&'static str> {
    match task_type {
        TaskType::ItemCreated | TaskType::ItemUpdated => Some("item"),
        TaskType::BuildCompleted => Some("build"),
        TaskType::PrCreated | TaskType::PrUpdated => Some("pr"),
        TaskType::PollingItems | TaskType::PollingBuilds | TaskType::PollingPullRequests | TaskType::Manual => None,
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn update_for_task(&self, task: &Task) -> Result<()> {
        let (Some(kind), Some(target)) = (tracked_kind(task.task_type), task.context.target_id.as_deref()) else {
            return Ok(());
        };
        let state = match task.task_type {
            TaskType::BuildCompleted => task.context.result.clone(),
            _ => task.context.new_state.clone(),
        };
        self.tracked.lock().await.insert(
            format!("{kind}:{target}"),
            TrackedState { state, task_id: task.id.clone(), updated_at: Utc::now() },
        );
        Ok(())
    }
}
