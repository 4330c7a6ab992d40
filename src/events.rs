//! Events pushed from the supervisor to its collaborators

use crate::supervisor::ConnectionState;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

/// Entries kept by `LogBuffer::default()`
pub const DEFAULT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub kind: LogKind,
    pub timestamp: SystemTime,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            timestamp: SystemTime::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogKind::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogKind::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogKind::Success, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    StatusChanged(ConnectionState),
    Log(LogEvent),
    ConnectionError(String),
}

/// Append-only log view that keeps the newest `capacity` entries
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEvent>,
    capacity: usize,
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.entries.iter()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
