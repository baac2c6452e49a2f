//! Spawning and supervision of the long running bridge tasks.
//!
//! Every task gets a handle on a shared shutdown signal so that the whole service can be wound down
//! gracefully, and a panic in any critical task triggers that shutdown.

mod manager;
mod pending_tasks;
mod shutdown;

pub use manager::{PanickedTaskError, TaskExecutor, TaskManager};
pub use pending_tasks::PendingTasks;
pub use shutdown::{Shutdown, ShutdownGuard, ShutdownSignal};
