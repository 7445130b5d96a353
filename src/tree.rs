//! Dependency tree: node resolution, graph building, and flattening.

pub mod builder;
pub mod flatten;
pub mod hasher;
pub mod node;
pub mod path;
pub mod resolver;
pub mod snapshot;
pub mod visited;

pub use builder::GraphBuilder;
pub use flatten::{flatten, DedupPolicy, Flattener};
pub use node::Node;
pub use resolver::{NodeResolver, ResolverOptions};
pub use snapshot::TreeSnapshot;
pub use visited::VisitedSet;
