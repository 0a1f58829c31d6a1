//! Task: immutable identity plus mutable lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::registrable_domain;
use crate::error::ErrorCode;
use crate::task::list::TaskList;
use crate::task::meta::TaskMeta;
use crate::task::status::{ErrorDetail, TaskState};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// 64-bit opaque identifier, globally unique per process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    fn fresh() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// What a task does once its fetch succeeds. A sum of two variants rather than
/// a stored closure, per §9's callback-dispatch design note: the Collector
/// pattern-matches on this when a fetch completes, instead of Task owning a
/// trait object it would need to be `Send + Sync + Clone` to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskKind {
    Scrape,
    Download { name: String, dir: String },
}

#[derive(Clone)]
pub struct Task {
    id: TaskId,
    parent_id: Option<TaskId>,
    parent: Option<Weak<RwLock<Task>>>,
    depth: u32,
    name: String,
    url: Url,
    domain: String,
    priority: i64,
    state: TaskState,
    kind: TaskKind,

    create_time: chrono::DateTime<Utc>,
    start_time: Option<chrono::DateTime<Utc>>,
    end_time: Option<chrono::DateTime<Utc>>,
    err_details: Vec<ErrorDetail>,

    meta: TaskMeta,
    children: Option<TaskList>,
}

impl Task {
    /// Assigns a fresh id; inherits `domain`/`depth`/`parent_id` from `parent` if given,
    /// else computes domain from `url`.
    pub fn new(name: impl Into<String>, parent: Option<&Arc<RwLock<Task>>>, url: Url, kind: TaskKind) -> Self {
        let (domain, depth, parent_id, parent_weak) = match parent {
            Some(p) => {
                let guard = p.read().expect("parent task lock poisoned");
                (
                    guard.domain.clone(),
                    guard.depth + 1,
                    Some(guard.id),
                    Some(Arc::downgrade(p)),
                )
            }
            None => (
                registrable_domain(&url).unwrap_or_else(|| url.host_str().unwrap_or("").to_string()),
                0,
                None,
                None,
            ),
        };

        Task {
            id: TaskId::fresh(),
            parent_id,
            parent: parent_weak,
            depth,
            name: name.into(),
            url,
            domain,
            priority: 0,
            state: TaskState::Init,
            kind,
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            err_details: Vec::new(),
            meta: TaskMeta::default(),
            children: None,
        }
    }

    pub fn set_priority(mut self, p: i64) -> Self {
        self.priority = p;
        self
    }

    pub fn reset_depth(mut self) -> Self {
        self.depth = 0;
        self
    }

    pub fn set_meta(mut self, f: impl FnOnce(&mut TaskMeta)) -> Self {
        f(&mut self.meta);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn parent_id(&self) -> Option<TaskId> {
        self.parent_id
    }

    pub fn parent(&self) -> Option<Arc<RwLock<Task>>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn create_time(&self) -> chrono::DateTime<Utc> {
        self.create_time
    }

    pub fn start_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<chrono::DateTime<Utc>> {
        self.end_time
    }

    pub fn err_details(&self) -> &[ErrorDetail] {
        &self.err_details
    }

    pub fn attempts_made(&self) -> usize {
        self.err_details.len() + matches!(self.state, TaskState::Running) as usize
    }

    pub fn meta(&self) -> &TaskMeta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut TaskMeta {
        &mut self.meta
    }

    /// Resets `create_time`, preserving priority; used by the retry backoff so
    /// a re-queued task sorts behind peers of equal priority (§4.4.1).
    pub fn touch_create_time(&mut self) {
        self.create_time = Utc::now();
    }

    pub fn record_start(&mut self) {
        self.state = TaskState::Running;
        self.start_time = Some(Utc::now());
        self.end_time = None;
    }

    /// State -> Successful; promotes to SuccessfulAll if every child already is.
    pub fn record_success(&mut self) {
        self.state = TaskState::Successful;
        self.end_time = Some(Utc::now());
        self.refresh_successful_all();
    }

    pub fn record_err(&mut self, code: ErrorCode, msg: impl Into<String>) {
        let start = self.start_time.unwrap_or_else(Utc::now);
        let end = Utc::now();
        self.state = TaskState::Failed;
        self.end_time = Some(end);
        self.err_details.push(ErrorDetail {
            start,
            end,
            cost: (end - start).to_std().unwrap_or_default(),
            code,
            msg: msg.into(),
        });
    }

    /// Attaches a child, lazily creating the child list. Demotes self from
    /// SuccessfulAll back to Successful, since a freshly-pushed child is not
    /// yet SuccessfulAll itself.
    pub fn push(&mut self, child: Arc<RwLock<Task>>) -> bool {
        if self.state == TaskState::SuccessfulAll {
            self.state = TaskState::Successful;
        }
        let children = self.children.get_or_insert_with(TaskList::new);
        children.push(child)
    }

    pub fn children(&self) -> Option<&TaskList> {
        self.children.as_ref()
    }

    /// Returns the next not-yet-dispatched child task, when self is Successful.
    pub fn next_child(&self) -> Option<Arc<RwLock<Task>>> {
        if self.state != TaskState::Successful {
            return None;
        }
        self.children.as_ref().and_then(|c| c.pop_next())
    }

    fn refresh_successful_all(&mut self) {
        if self.state != TaskState::Successful {
            return;
        }
        if let Some(children) = &self.children {
            if children.is_successful_all() {
                self.state = TaskState::SuccessfulAll;
            }
        }
    }

    /// True iff state is SuccessfulAll, or Successful with no children.
    pub fn is_successful(&self) -> bool {
        match self.state {
            TaskState::SuccessfulAll => true,
            TaskState::Successful => self.children.is_none(),
            _ => false,
        }
    }

    pub fn is_successful_all(&self) -> bool {
        self.state == TaskState::SuccessfulAll
            || (self.state == TaskState::Successful && self.children.is_none())
    }

    /// Pre-order traversal snapshot: self, then each child's subtree.
    pub fn list_all(&self) -> Vec<Arc<RwLock<Task>>> {
        let mut out = Vec::new();
        if let Some(children) = &self.children {
            for child in children.list() {
                out.push(child.clone());
                let guard = child.read().expect("child task lock poisoned");
                out.extend(guard.list_all());
            }
        }
        out
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]{}: {}", self.id, self.name, self.url)
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("domain", &self.domain)
            .field("depth", &self.depth)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("attempts", &self.err_details.len())
            .finish()
    }
}
