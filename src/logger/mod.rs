//! Bounded in-memory log history with broadcast fan-out.
//!
//! Grounded on the swarm callback server's `ServerState`/`push_event` pattern:
//! a `VecDeque` that drops its oldest entry once at capacity. Each append also
//! fires a `tracing::event!` at the matching level, so the ring buffer (the
//! dashboard's view) and `tracing`'s stderr/file output (the operator's view)
//! never drift apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::{RwLock, broadcast};

const DEFAULT_CAPACITY: usize = 500;
const BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

struct Buffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

pub struct RingBufferLogger {
    buffer: RwLock<Buffer>,
    sender: broadcast::Sender<LogEntry>,
}

impl RingBufferLogger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            buffer: RwLock::new(Buffer {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Snapshot the current buffer and subscribe as one indivisible operation,
    /// so a late joiner never misses or duplicates an entry appended between
    /// the snapshot and the subscription.
    pub async fn snapshot_and_subscribe(&self) -> (Vec<LogEntry>, broadcast::Receiver<LogEntry>) {
        let guard = self.buffer.read().await;
        let snapshot: Vec<LogEntry> = guard.entries.iter().cloned().collect();
        let receiver = self.sender.subscribe();
        (snapshot, receiver)
    }

    pub async fn recent_entries(&self) -> Vec<LogEntry> {
        self.buffer.read().await.entries.iter().cloned().collect()
    }

    pub async fn log(
        &self,
        level: LogLevel,
        component: impl Into<String>,
        message: impl Into<String>,
        phase: Option<String>,
        step: Option<String>,
        meta: Option<serde_json::Value>,
    ) {
        let component = component.into();
        let message = message.into();
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: component.clone(),
            message: message.clone(),
            phase,
            step,
            meta,
        };

        {
            let mut guard = self.buffer.write().await;
            if guard.entries.len() >= guard.capacity {
                guard.entries.pop_front();
            }
            guard.entries.push_back(entry.clone());
        }

        match level {
            LogLevel::Debug => tracing::debug!(component = %component, "{message}"),
            LogLevel::Info => tracing::info!(component = %component, "{message}"),
            LogLevel::Warn => tracing::warn!(component = %component, "{message}"),
            LogLevel::Error => tracing::error!(component = %component, "{message}"),
        }

        // A broadcast send fails only when there are no subscribers; that's fine.
        let _ = self.sender.send(entry);
    }
}

impl Default for RingBufferLogger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
