//! epd — policy enforcement-point host.
//!
//! The policy manager pushes decision signals at registered enforcement
//! points; this crate receives them, fans the named decision sets out to
//! locally subscribed handlers, and returns exactly one aggregated
//! acknowledgment per transaction once every interested handler has
//! answered — inline or deferred, one handler or many.
//!
//! The core lives in [`signaling`]; [`bus`] adapts it to the manager's
//! JSON-RPC bus and carries the one-time registration handshake.

pub mod bus;
pub mod config;
pub mod signaling;

use std::sync::Arc;
use std::time::Instant;

use config::EpConfig;
use signaling::{Dispatcher, StatusSink, SubscriptionRegistry, TransactionCoordinator};

/// Shared state for one running enforcement point.
///
/// All registries are explicit, owned state — two contexts in one process
/// never share a table.
pub struct EpContext {
    pub config: EpConfig,
    pub registry: Arc<SubscriptionRegistry>,
    pub coordinator: Arc<TransactionCoordinator>,
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: Instant,
}

impl EpContext {
    /// Wire the core together around the given acknowledgment sink.
    pub fn new(config: EpConfig, sink: Arc<dyn StatusSink>) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let coordinator = TransactionCoordinator::new(sink);
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), coordinator.clone()));
        Self {
            config,
            registry,
            coordinator,
            dispatcher,
            started_at: Instant::now(),
        }
    }
}
