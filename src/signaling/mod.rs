//! Decision signaling core.
//!
//! The manager pushes decision signals at this enforcement point; each one
//! carries a transaction id and zero or more named decision sets. The
//! [`Dispatcher`] decodes a signal, fans every decision set out to the
//! subscribed handlers, and hands the acknowledgment bookkeeping to the
//! [`TransactionCoordinator`] so the manager gets exactly one status back
//! per transaction — no matter how many handlers answer, or when.
//!
//! Flow for one inbound signal:
//!
//! 1. Read the transaction id; open a transaction record when it is
//!    non-zero (before decoding, so a torn message still gets answered).
//! 2. Decode the body best-effort into decision sets plus a well-formed
//!    flag.
//! 3. Per set, in wire order: invoke every matching subscription, counting
//!    each invocation against the transaction before the handler runs.
//! 4. Seal the transaction (or answer immediately when no handler was
//!    interested, or when the id is zero).

pub mod decode;
pub mod registry;
pub mod transaction;
pub mod value;

pub use registry::{DecisionHandler, SubscriptionId, SubscriptionRegistry};
pub use transaction::{Completion, StatusSink, TransactionCoordinator};
pub use value::{Decision, DecisionSet, KeyValuePair, PolicyValue, ValueKind};

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

/// Inbound entry point: ties the decoder, the subscription registry and the
/// transaction coordinator together. One per enforcement point.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    coordinator: Arc<TransactionCoordinator>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Process one decision signal. Messages are handed in one at a time;
    /// handlers run synchronously inside this call, so a handler's inline
    /// completion is always preceded by its pending increment.
    pub fn dispatch(&self, signal: &str, params: &Value) {
        let Some(txid) = decode::transaction_id(params) else {
            warn!(signal, "decision signal without readable transaction id — dropped");
            return;
        };

        self.coordinator.begin(txid);

        let decoded = decode::decode_entries(params);
        debug!(
            signal,
            txid,
            sets = decoded.sets.len(),
            well_formed = decoded.well_formed,
            "decision signal decoded"
        );

        let mut invoked = false;
        for set in decoded.sets {
            for handler in self.registry.matching(signal, set.name()) {
                self.coordinator.add_pending(txid);
                invoked = true;
                handler(&set, self.coordinator.completion(txid));
            }
            // The set is dropped here; handlers have extracted what they need.
        }

        if txid == 0 {
            // Fire-and-forget: no record was kept, but the outcome signal
            // still goes out, reporting decode health.
            self.coordinator.emit_untracked(0, decoded.well_formed);
        } else if invoked {
            self.coordinator.seal(txid, decoded.well_formed);
        } else {
            self.coordinator.abandon(txid, decoded.well_formed);
        }
    }
}
