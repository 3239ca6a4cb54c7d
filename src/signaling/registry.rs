//! Handler subscriptions for inbound decision signals.
//!
//! A subscription names the signal it listens to and, optionally, the
//! decision-set names it cares about. The dispatcher consults the registry
//! once per decoded decision set; every matching subscription receives its
//! own invocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::transaction::Completion;
use super::value::DecisionSet;

/// Callback invoked once per matching decision set.
///
/// The handler borrows the set — anything it needs later must be extracted
/// before returning. The [`Completion`] may be fired inline or stored and
/// fired from another task once the handler's work is done.
pub type DecisionHandler = dyn Fn(&DecisionSet, Completion) + Send + Sync;

/// Opaque handle identifying one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    signal: String,
    /// Decision-set names of interest. Empty = every name.
    interest: Vec<String>,
    handler: Arc<DecisionHandler>,
}

impl Subscription {
    fn matches(&self, signal: &str, set_name: &str) -> bool {
        self.signal == signal
            && (self.interest.is_empty() || self.interest.iter().any(|n| n == set_name))
    }
}

/// Table of decision handlers, owned state rather than process-wide statics
/// so tests and multi-instance embeddings stay independent.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `signal`.
    ///
    /// `interest` is a snapshot taken now; it is never refreshed. An empty
    /// interest list subscribes to every decision-set name on the signal.
    pub fn subscribe<F>(&self, signal: &str, interest: &[&str], handler: F) -> SubscriptionId
    where
        F: Fn(&DecisionSet, Completion) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table().push(Subscription {
            id,
            signal: signal.to_string(),
            interest: interest.iter().map(|n| n.to_string()).collect(),
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Returns `false` when the handle is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table();
        let before = table.len();
        table.retain(|s| s.id != id);
        table.len() != before
    }

    /// Handlers interested in `set_name` on `signal`, in subscription order.
    ///
    /// Handlers are cloned out of the lock so an invoked handler may itself
    /// subscribe or unsubscribe.
    pub(crate) fn matching(&self, signal: &str, set_name: &str) -> Vec<Arc<DecisionHandler>> {
        self.table()
            .iter()
            .filter(|s| s.matches(signal, set_name))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> impl Fn(&DecisionSet, Completion) + Send + Sync + 'static {
        |_set, _completion| {}
    }

    #[test]
    fn empty_interest_matches_every_set_name() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("actions", &[], noop());

        assert_eq!(registry.matching("actions", "audio_route").len(), 1);
        assert_eq!(registry.matching("actions", "anything").len(), 1);
        assert_eq!(registry.matching("other", "audio_route").len(), 0);
    }

    #[test]
    fn interest_list_is_an_exact_filter() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("actions", &["audio_route", "volume_limit"], noop());

        assert_eq!(registry.matching("actions", "audio_route").len(), 1);
        assert_eq!(registry.matching("actions", "volume_limit").len(), 1);
        assert_eq!(registry.matching("actions", "audio").len(), 0);
        assert_eq!(registry.matching("actions", "audio_route2").len(), 0);
    }

    #[test]
    fn shared_signal_names_match_independently() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("actions", &["audio_route"], noop());
        registry.subscribe("actions", &[], noop());
        registry.subscribe("actions", &["video_route"], noop());

        assert_eq!(registry.matching("actions", "audio_route").len(), 2);
        assert_eq!(registry.matching("actions", "video_route").len(), 2);
        assert_eq!(registry.matching("actions", "other").len(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_the_handle() {
        let registry = SubscriptionRegistry::new();
        let a = registry.subscribe("actions", &[], noop());
        let b = registry.subscribe("actions", &[], noop());

        assert!(registry.unsubscribe(a));
        assert!(!registry.unsubscribe(a));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.matching("actions", "x").len(), 1);
        assert!(registry.unsubscribe(b));
        assert!(registry.is_empty());
    }
}
