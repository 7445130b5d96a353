//! Live rebuilds driven by file changes.
mod controller;

pub use controller::{LiveRebuildController, RootKey, RootPhase, SubscriberFn, SubscriberId};
