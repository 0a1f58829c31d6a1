//! Priority-ordered, deduplicated, never-GC'd container of tasks.
//!
//! Grounded on the teacher's `queue::task_queue::TaskQueue` (`PrioritizedTask` /
//! `BinaryHeap`) pattern: a max-heap keyed by `(priority desc, create_time asc)`
//! sits alongside plain maps for O(1) id/url lookup. Unlike the teacher's queue,
//! nothing is ever dropped from `by_id` during a run — completed tasks stay
//! there for the Snapshot API and `list_all()` traversal; only the heap entry
//! (the "still waiting to be dispatched" marker) is consumed by `pop_next`.

use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::task::status::TaskState;
use crate::task::task::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapKey {
    id: TaskId,
    priority: i64,
    create_time: DateTime<Utc>,
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; ties broken by earliest create_time first.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.create_time.cmp(&self.create_time))
    }
}

#[derive(Default)]
pub struct TaskList {
    heap: RwLock<BinaryHeap<HeapKey>>,
    by_id: RwLock<HashMap<TaskId, Arc<RwLock<Task>>>>,
    by_url: RwLock<HashMap<String, TaskId>>,
}

impl Clone for TaskList {
    fn clone(&self) -> Self {
        TaskList {
            heap: RwLock::new(self.heap.read().expect("heap lock poisoned").clone()),
            by_id: RwLock::new(self.by_id.read().expect("by_id lock poisoned").clone()),
            by_url: RwLock::new(self.by_url.read().expect("by_url lock poisoned").clone()),
        }
    }
}

fn is_terminal(state: TaskState) -> bool {
    matches!(
        state,
        TaskState::Failed | TaskState::Successful | TaskState::SuccessfulAll
    )
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a task. A no-op (returns `false`) if a non-terminal task with
    /// the same URL is already present.
    pub fn push(&self, task: Arc<RwLock<Task>>) -> bool {
        let (id, url, priority, create_time, state) = {
            let guard = task.read().expect("task lock poisoned");
            (
                guard.id(),
                guard.url().to_string(),
                guard.priority(),
                guard.create_time(),
                guard.state(),
            )
        };

        {
            let by_url = self.by_url.read().expect("by_url lock poisoned");
            if by_url.contains_key(&url) {
                return false;
            }
        }

        self.by_id.write().expect("by_id lock poisoned").insert(id, task);
        if !is_terminal(state) {
            self.by_url
                .write()
                .expect("by_url lock poisoned")
                .insert(url, id);
            self.heap.write().expect("heap lock poisoned").push(HeapKey {
                id,
                priority,
                create_time,
            });
        }
        true
    }

    /// Re-queues a task already present in `by_id` (used by the retry backoff):
    /// updates its url index and heap entry to match its current priority/create_time.
    pub fn requeue(&self, id: TaskId) {
        let by_id = self.by_id.read().expect("by_id lock poisoned");
        let Some(task) = by_id.get(&id) else { return };
        let guard = task.read().expect("task lock poisoned");
        if is_terminal(guard.state()) {
            return;
        }
        self.heap.write().expect("heap lock poisoned").push(HeapKey {
            id,
            priority: guard.priority(),
            create_time: guard.create_time(),
        });
        self.by_url
            .write()
            .expect("by_url lock poisoned")
            .insert(guard.url().to_string(), id);
    }

    /// Pops the highest-priority, earliest-created non-terminal task. Lazily
    /// discards stale heap entries for tasks that were deleted or already
    /// completed via another path.
    pub fn pop_next(&self) -> Option<Arc<RwLock<Task>>> {
        loop {
            let key = self.heap.write().expect("heap lock poisoned").pop()?;
            let by_id = self.by_id.read().expect("by_id lock poisoned");
            let Some(task) = by_id.get(&key.id).cloned() else {
                continue;
            };
            drop(by_id);
            {
                let guard = task.read().expect("task lock poisoned");
                if is_terminal(guard.state()) {
                    continue;
                }
            }
            self.by_url
                .write()
                .expect("by_url lock poisoned")
                .retain(|_, v| *v != key.id);
            return Some(task);
        }
    }

    pub fn query(&self, id: TaskId) -> Option<Arc<RwLock<Task>>> {
        self.by_id.read().expect("by_id lock poisoned").get(&id).cloned()
    }

    pub fn query_by_name(&self, name: &str) -> Option<Arc<RwLock<Task>>> {
        self.by_id
            .read()
            .expect("by_id lock poisoned")
            .values()
            .find(|t| t.read().expect("task lock poisoned").name() == name)
            .cloned()
    }

    pub fn delete(&self, id: TaskId) -> Option<Arc<RwLock<Task>>> {
        let removed = self.by_id.write().expect("by_id lock poisoned").remove(&id);
        if removed.is_some() {
            self.by_url
                .write()
                .expect("by_url lock poisoned")
                .retain(|_, v| *v != id);
        }
        removed
    }

    pub fn list(&self) -> Vec<Arc<RwLock<Task>>> {
        self.by_id
            .read()
            .expect("by_id lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.read().expect("by_id lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.heap.read().expect("heap lock poisoned").len()
    }

    pub fn is_successful_all(&self) -> bool {
        self.by_id
            .read()
            .expect("by_id lock poisoned")
            .values()
            .all(|t| t.read().expect("task lock poisoned").is_successful_all())
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.by_url.read().expect("by_url lock poisoned").contains_key(url)
    }
}
