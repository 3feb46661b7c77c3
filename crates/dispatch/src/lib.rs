//! # Workpool Dispatch
//!
//! Priority-aware, load-balanced task admission and dispatch for a fixed-size
//! worker pool.
//!
//! ## Features
//!
//! - **Admission control**: an optional backlog limit with a pluggable [`OverflowPolicy`]
//! - **Load balancing**: unpinned tasks go to the least-loaded worker
//! - **Strict priorities**: `High`, then `Mid`, then `Low`; FIFO within a level
//! - **Shared access**: [`SharedDispatcher`] guards the whole state with one lock
//!
//! The dispatcher only keeps books. Spawning workers, moving payloads and
//! running the work belong to whatever drives it.
//!
//! ## Architecture
//!
//! ```text
//!   producer ──add(task, priority, worker?)──┐
//!                                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                            │
//! │  backlog >= max_queued? ──► OverflowPolicy (admit / drop)   │
//! │  worker = pinned or least-loaded                            │
//! │                                                              │
//! │  worker 0: [high] [mid] [low]  load                          │
//! │  worker 1: [high] [mid] [low]  load                          │
//! │  ...                                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                                            │
//!   consumer ◄──────get_next(worker?)────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use workpool_dispatch::prelude::*;
//!
//! let config = DispatcherConfig::new(2)
//!     .with_max_queued(2)
//!     .with_overflow_policy(OverflowPolicyKind::RejectIncoming);
//! let mut dispatcher = Dispatcher::from_config(&config).unwrap();
//!
//! assert!(dispatcher.add("a", PriorityLevel::Low, None).unwrap().is_admitted());
//! assert!(dispatcher.add("b", PriorityLevel::High, None).unwrap().is_admitted());
//! assert_eq!(dispatcher.add("c", PriorityLevel::High, None).unwrap(), Admission::Dropped);
//!
//! assert_eq!(dispatcher.get_next(None).unwrap(), "b");
//! assert_eq!(dispatcher.get_next(None).unwrap(), "a");
//! assert!(!dispatcher.has_next(None));
//! ```

pub mod config;
pub mod dispatcher;
pub mod policy;
pub mod priority;
mod queue;
pub mod shared;
pub mod stats;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::DispatcherConfig;
    pub use crate::dispatcher::{Admission, DispatchError, Dispatcher};
    pub use crate::policy::{AlwaysAdmit, OverflowPolicy, OverflowPolicyKind, RejectIncoming};
    pub use crate::priority::PriorityLevel;
    pub use crate::shared::SharedDispatcher;
    pub use crate::stats::DispatcherStats;
}

// Re-export key types at crate root
pub use config::DispatcherConfig;
pub use dispatcher::{Admission, DispatchError, Dispatcher};
pub use policy::{
    AlwaysAdmit, OverflowPolicy, OverflowPolicyKind, ParsePolicyError, RejectIncoming,
};
pub use priority::{ParsePriorityError, PriorityLevel};
pub use shared::SharedDispatcher;
pub use stats::DispatcherStats;
