//! File watching: OS notification backends and the shared watch registry.

mod notifier;
mod registry;

pub use notifier::{
    FileNotifier, FileStat, ManualNotifier, NotifyNotifier, PollingNotifier, StatCallback,
};
pub use registry::{Listener, ListenerId, WatchRegistry};
