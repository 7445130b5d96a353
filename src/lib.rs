//! Stitch: Dependency-Ordered Artifact Builds
//!
//! Resolves a root artifact into a tree of everything it references, flattens
//! that tree into a dependency-first sequence, and keeps the result current as
//! files on disk change.

pub mod config;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod io;
pub mod live;
pub mod logging;
pub mod tooling;
pub mod tree;
pub mod types;
pub mod watch;

pub use error::{ApiError, NodeError, WatchError};
pub use handler::{HandlerOutput, HandlerRegistry, NodeContext, TypeHandler};
pub use live::{LiveRebuildController, RootPhase, SubscriberId};
pub use tree::{flatten, DedupPolicy, Flattener, GraphBuilder, Node, NodeResolver, TreeSnapshot};
pub use types::{Descriptor, Source};
pub use watch::{FileNotifier, FileStat, ListenerId, WatchRegistry};
