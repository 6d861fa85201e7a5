//! Flow-local correlation ids
//!
//! Every logical call chain carries one active correlation id so that retry,
//! circuit and completion events can be joined back to the request that caused
//! them. Ids live on a per-flow stack:
//!
//! - Inside [`CorrelationContext::flow`] the stack is a tokio task-local, so
//!   concurrent flows never see each other's ids.
//! - A tokio task that never entered a flow gets a stack keyed by its task id,
//!   so tasks sharing a worker thread stay isolated.
//! - Outside any task (plain synchronous code) a thread-local stack is used.
//!
//! Scopes push onto the stack and pop on release, so nested scopes restore the
//! outer id when they end, including on error and panic paths.
//!
//! # Example
//!
//! ```
//! use storelink_core_resilience::correlation::CorrelationContext;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! CorrelationContext::flow(async {
//!     let outer = CorrelationContext::current();
//!     {
//!         let _scope = CorrelationContext::start_scope(Some("order-42"));
//!         assert_eq!(CorrelationContext::current(), "order-42");
//!     }
//!     assert_eq!(CorrelationContext::current(), outer);
//! })
//! .await;
//! # }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::task;
use uuid::Uuid;

/// Maximum correlation id length unless configured otherwise
pub const DEFAULT_MAX_LEN: usize = 36;

tokio::task_local! {
    static FLOW: RefCell<Vec<String>>;
}

thread_local! {
    static THREAD: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Stacks of tasks running outside a flow; an entry lives only while a scope is active
static TASKS: OnceLock<Mutex<HashMap<task::Id, Vec<String>>>> = OnceLock::new();

fn task_stacks() -> &'static Mutex<HashMap<task::Id, Vec<String>>> {
    TASKS.get_or_init(|| Mutex::new(HashMap::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Flow,
    Task(task::Id),
    Thread,
}

fn storage() -> Storage {
    if FLOW.try_with(|_| ()).is_ok() {
        Storage::Flow
    } else if let Some(id) = task::try_id() {
        Storage::Task(id)
    } else {
        Storage::Thread
    }
}

fn with_stack<R>(storage: Storage, f: impl FnOnce(&mut Vec<String>) -> R) -> Option<R> {
    match storage {
        Storage::Flow => FLOW.try_with(|cell| f(&mut cell.borrow_mut())).ok(),
        Storage::Task(id) => {
            let mut tasks = task_stacks()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let stack = tasks.entry(id).or_default();
            let result = f(stack);
            if stack.is_empty() {
                tasks.remove(&id);
            }
            Some(result)
        }
        Storage::Thread => THREAD.try_with(|cell| f(&mut cell.borrow_mut())).ok(),
    }
}

/// Entry points for reading and scoping the ambient correlation id
pub struct CorrelationContext;

impl CorrelationContext {
    /// The active id for this flow, generating and installing one if absent
    ///
    /// A task outside any flow and without an active scope gets a fresh id on
    /// every call; nothing is installed, since no scope would ever remove it.
    pub fn current() -> String {
        let storage = storage();
        let install = !matches!(storage, Storage::Task(_));
        with_stack(storage, |stack| {
            if let Some(id) = stack.last() {
                return id.clone();
            }
            let id = Self::generate();
            if install {
                stack.push(id.clone());
            }
            id
        })
        .unwrap_or_else(Self::generate)
    }

    /// The active id, without generating one
    pub fn peek() -> Option<String> {
        with_stack(storage(), |stack| stack.last().cloned()).flatten()
    }

    /// Install `id` (or a fresh id) as current until the returned scope is released
    pub fn start_scope(id: Option<&str>) -> CorrelationScope {
        Self::start_scope_with_limit(id, DEFAULT_MAX_LEN)
    }

    /// Like [`start_scope`](Self::start_scope) with an explicit length limit
    pub fn start_scope_with_limit(id: Option<&str>, max_len: usize) -> CorrelationScope {
        let id = id
            .and_then(|raw| sanitize(raw, max_len))
            .unwrap_or_else(|| truncate(&Self::generate(), max_len));

        let storage = storage();
        let depth = with_stack(storage, |stack| {
            let depth = stack.len();
            stack.push(id.clone());
            depth
        })
        .unwrap_or(0);

        CorrelationScope {
            id,
            depth,
            storage,
            released: false,
        }
    }

    /// Run `fut` as a new logical flow with its own correlation stack
    pub async fn flow<F: Future>(fut: F) -> F::Output {
        FLOW.scope(RefCell::new(Vec::new()), fut).await
    }

    /// Run `fut` as a new flow seeded with `id`
    pub async fn flow_with_id<F: Future>(id: &str, fut: F) -> F::Output {
        let seed = sanitize(id, DEFAULT_MAX_LEN)
            .map(|id| vec![id])
            .unwrap_or_default();
        FLOW.scope(RefCell::new(seed), fut).await
    }

    /// Bind `fut` to the caller's current id so it can be spawned as a
    /// continuation of the same flow
    pub fn bind<F: Future>(fut: F) -> impl Future<Output = F::Output> {
        let id = Self::current();
        FLOW.scope(RefCell::new(vec![id]), fut)
    }

    /// Whether the caller runs inside a task-local flow
    pub fn in_flow() -> bool {
        storage() == Storage::Flow
    }

    /// Generate a new random id
    pub fn generate() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Handle for an installed correlation id
///
/// Releasing restores the id that was current before the scope started.
/// Release happens on drop; releasing more than once is a no-op.
#[derive(Debug)]
pub struct CorrelationScope {
    id: String,
    depth: usize,
    storage: Storage,
    released: bool,
}

impl CorrelationScope {
    /// The id installed by this scope
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this scope has been released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Restore the previous id
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let depth = self.depth;
        // Truncation also discards inner scopes that were leaked or released out of order
        let _ = with_stack(self.storage, |stack| stack.truncate(depth));
    }
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        self.release();
    }
}

/// Trim and truncate a caller-supplied id; `None` when nothing usable remains
pub fn sanitize(raw: &str, max_len: usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let id = truncate(trimmed, max_len);
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

fn truncate(id: &str, max_len: usize) -> String {
    id.chars().take(max_len).collect()
}
