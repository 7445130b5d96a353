//! Graph Builder
//!
//! Drives the resolver from root descriptors and wraps each result in an
//! immutable [`TreeSnapshot`]. Roots are resolved strictly one at a time in
//! the order they were queued; each root gets its own independently resolved
//! nodes, even when it shares files with another root.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::tree::resolver::NodeResolver;
use crate::tree::snapshot::TreeSnapshot;
use crate::types::Descriptor;

/// Serial root-resolution queue.
pub struct GraphBuilder {
    resolver: Arc<NodeResolver>,
    /// Held for the duration of one root resolution; tokio's mutex is FIFO.
    gate: tokio::sync::Mutex<()>,
    pending: Mutex<VecDeque<(u64, Descriptor)>>,
    next_ticket: AtomicU64,
    generation: AtomicU64,
    /// Snapshots appended by `build` and `add_root`, in resolution order.
    roots: RwLock<Vec<Arc<TreeSnapshot>>>,
}

impl GraphBuilder {
    pub fn new(resolver: Arc<NodeResolver>) -> Self {
        Self {
            resolver,
            gate: tokio::sync::Mutex::new(()),
            pending: Mutex::new(VecDeque::new()),
            next_ticket: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            roots: RwLock::new(Vec::new()),
        }
    }

    pub fn resolver(&self) -> &Arc<NodeResolver> {
        &self.resolver
    }

    /// Resolve one root through the queue without appending it to the sequence.
    pub async fn resolve_root(&self, descriptor: &Descriptor) -> Arc<TreeSnapshot> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push_back((ticket, descriptor.clone()));
        let queued = PendingTicket {
            pending: &self.pending,
            ticket,
        };
        let _turn = self.gate.lock().await;
        drop(queued);

        let started = Instant::now();
        let root = self.resolver.resolve_root(descriptor).await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(TreeSnapshot::new(root, generation));

        info!(
            root = %snapshot.root().label(),
            generation,
            nodes = snapshot.node_count(),
            errors = snapshot.errors().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Resolved root"
        );
        snapshot
    }

    /// Resolve `descriptor` and append its snapshot to the running sequence.
    pub async fn add_root(&self, descriptor: Descriptor) -> Arc<TreeSnapshot> {
        let snapshot = self.resolve_root(&descriptor).await;
        self.roots.write().push(Arc::clone(&snapshot));
        snapshot
    }

    /// Resolve every root in order, appending each.
    pub async fn build(&self, roots: &[Descriptor]) -> Vec<Arc<TreeSnapshot>> {
        debug!(roots = roots.len(), "Building roots");
        let mut out = Vec::with_capacity(roots.len());
        for root in roots {
            out.push(self.add_root(root.clone()).await);
        }
        out
    }

    /// Snapshots appended so far.
    pub fn snapshots(&self) -> Vec<Arc<TreeSnapshot>> {
        self.roots.read().clone()
    }

    /// Roots waiting for their turn, oldest first.
    pub fn pending_roots(&self) -> Vec<Descriptor> {
        self.pending.lock().iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.lock().is_empty() && self.gate.try_lock().is_ok()
    }
}

/// Removes a queued ticket once its turn comes or its future is dropped.
struct PendingTicket<'a> {
    pending: &'a Mutex<VecDeque<(u64, Descriptor)>>,
    ticket: u64,
}

impl Drop for PendingTicket<'_> {
    fn drop(&mut self) {
        self.pending.lock().retain(|(t, _)| *t != self.ticket);
    }
}
