//! Read-only row snapshots for external observers (§4.8).

use chrono::{DateTime, Utc};

use crate::task::{Task, TaskId, TaskState};

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: TaskId,
    pub name: String,
    pub domain: String,
    pub state: TaskState,
    pub url: String,
    pub create_time: DateTime<Utc>,
    pub age: String,
    pub last_error: Option<String>,
}

impl Row {
    pub fn from_task(task: &Task) -> Self {
        let age = match (task.start_time(), task.end_time()) {
            (Some(start), Some(end)) => format_age(end - start),
            (Some(start), None) => format_age(Utc::now() - start),
            (None, _) => format_age(chrono::Duration::zero()),
        };

        let last_error = task.err_details().last().map(|e| e.to_string());

        Row {
            id: task.id(),
            name: task.name().to_string(),
            domain: task.domain().to_string(),
            state: task.state(),
            url: task.url().to_string(),
            create_time: task.create_time(),
            age,
            last_error,
        }
    }
}

fn format_age(duration: chrono::Duration) -> String {
    let secs = duration.num_milliseconds().max(0) as f64 / 1000.0;
    format!("{secs:.1}s")
}
