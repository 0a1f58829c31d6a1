//! Task state machine and error attempt history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Init,
    Scheduling,
    Running,
    Failed,
    Successful,
    SuccessfulAll,
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Init
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Init => "Init",
            TaskState::Scheduling => "Scheduling",
            TaskState::Running => "Running",
            TaskState::Failed => "Failed",
            TaskState::Successful => "Successful",
            TaskState::SuccessfulAll => "SuccessfulAll",
        };
        write!(f, "{s}")
    }
}

/// One failed attempt. Append-only; `start`/`end`/`cost` mirror the attempt's wall-clock span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cost: Duration,
    pub code: ErrorCode,
    pub msg: String,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ERR[{}] start:{} cost: {:.1}s msg: {}",
            self.code.as_u32(),
            self.start.format("%H:%M:%S%.3f"),
            self.cost.as_secs_f64(),
            self.msg
        )
    }
}
