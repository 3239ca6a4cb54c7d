// SPDX-License-Identifier: MIT
//! In-flight transaction accounting and acknowledgment emission.
//!
//! Every decision signal with a non-zero transaction id expects exactly one
//! status back. Handlers may answer inline or hold their [`Completion`] and
//! answer from another task later; the coordinator counts outstanding
//! answers and decides when — and with what outcome — the single status for
//! the transaction goes out.
//!
//! # State machine
//!
//! ```text
//! begin ──► Open(pending, sealed=false)
//!             │ add_pending / complete(success)    adjust the counter
//!             │ seal                               last set dispatched
//!             ▼
//!           pending == 0 && sealed ──► status(decode_ok) ──► removed
//!           complete(failure)      ──► status(0), immediately ──► removed
//! ```
//!
//! First failure wins: a failure acknowledges the transaction at once and
//! removes it, superseding anything still pending. Completions that arrive
//! for an id no longer in the table are defined no-ops, not errors.
//!
//! There is no timeout: a handler that never completes leaves its
//! transaction open forever. Known limitation, kept on purpose.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

/// Where acknowledgment statuses go. The bus adapter forwards them to the
/// manager; tests record them.
pub trait StatusSink: Send + Sync {
    fn emit_status(&self, txid: u32, success: bool);
}

#[derive(Debug)]
struct Transaction {
    /// Handler invocations not yet answered.
    pending: u32,
    /// Set once the dispatcher has handed out the message's last set.
    sealed: bool,
    /// Whether the message decoded clean; ANDed into the final status.
    decode_ok: bool,
}

/// Owns every live transaction record. Constructed once at startup and
/// shared by handle — never a process-wide static.
pub struct TransactionCoordinator {
    table: Mutex<HashMap<u32, Transaction>>,
    sink: Arc<dyn StatusSink>,
}

impl TransactionCoordinator {
    pub fn new(sink: Arc<dyn StatusSink>) -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(HashMap::new()),
            sink,
        })
    }

    /// Open a record for `txid` before its message body is decoded, so a
    /// mid-decode failure still has something to finalize against.
    /// Id zero is fire-and-forget and gets no record.
    pub(crate) fn begin(&self, txid: u32) {
        if txid == 0 {
            return;
        }
        self.table().entry(txid).or_insert(Transaction {
            pending: 0,
            sealed: false,
            decode_ok: true,
        });
        trace!(txid, "transaction opened");
    }

    /// Account for one handler invocation, before the handler runs — an
    /// inline completion then nets out to the right count.
    ///
    /// A missing record means a handler already failed the transaction
    /// earlier in this same message; the invocation proceeds unaccounted.
    pub(crate) fn add_pending(&self, txid: u32) {
        if txid == 0 {
            return;
        }
        match self.table().get_mut(&txid) {
            Some(tx) => tx.pending += 1,
            None => debug!(txid, "transaction already closed — invocation not counted"),
        }
    }

    /// Mark the message fully dispatched and record its decode outcome.
    /// Finalizes right away when nothing is pending.
    pub(crate) fn seal(&self, txid: u32, decode_ok: bool) {
        let mut table = self.table();
        let Some(tx) = table.get_mut(&txid) else {
            // A handler already failed and acknowledged the transaction.
            debug!(txid, "seal on closed transaction — status already sent");
            return;
        };
        tx.sealed = true;
        tx.decode_ok = decode_ok;
        if tx.pending == 0 {
            let ok = tx.decode_ok;
            table.remove(&txid);
            drop(table);
            self.sink.emit_status(txid, ok);
        }
    }

    /// Close a transaction no handler was interested in, reporting decode
    /// health as the outcome.
    pub(crate) fn abandon(&self, txid: u32, decode_ok: bool) {
        self.table().remove(&txid);
        self.sink.emit_status(txid, decode_ok);
    }

    /// Emit a status outside any transaction record. Used for the id-zero
    /// outcome signal, which is sent even though nothing was tracked.
    pub(crate) fn emit_untracked(&self, txid: u32, success: bool) {
        self.sink.emit_status(txid, success);
    }

    /// Handler answer for `token`.
    ///
    /// Success decrements the pending count and finalizes once the message
    /// is sealed and nothing is outstanding. Failure acknowledges
    /// negatively at once, irrespective of the pending count. Tokens with
    /// no record — id zero, late, or duplicate — are ignored.
    pub(crate) fn complete(&self, token: u32, success: bool) {
        if token == 0 {
            return;
        }
        let mut table = self.table();
        let Some(tx) = table.get_mut(&token) else {
            debug!(txid = token, "completion for unknown transaction — ignored");
            return;
        };

        if !success {
            table.remove(&token);
            drop(table);
            self.sink.emit_status(token, false);
            return;
        }

        tx.pending = tx.pending.saturating_sub(1);
        if tx.pending == 0 && tx.sealed {
            let ok = tx.decode_ok;
            table.remove(&token);
            drop(table);
            self.sink.emit_status(token, ok);
        }
    }

    /// Build a completion handle carrying `token`.
    pub fn completion(self: &Arc<Self>, token: u32) -> Completion {
        Completion {
            token,
            coordinator: Arc::clone(self),
        }
    }

    /// Number of transactions still open. Stays non-zero forever if a
    /// handler never answers.
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u32, Transaction>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The token a handler passes back to signal it has finished acting on a
/// decision set. Cloneable and `Send` so deferred handlers can answer from
/// wherever their work ends up running.
#[derive(Clone)]
pub struct Completion {
    token: u32,
    coordinator: Arc<TransactionCoordinator>,
}

impl Completion {
    /// The transaction id this completion answers. Zero means the answer
    /// is meaningless (fire-and-forget message).
    pub fn token(&self) -> u32 {
        self.token
    }

    /// Report the handler's outcome. May be called from any task; calling
    /// it more than once makes the extra calls no-ops.
    pub fn complete(&self, success: bool) {
        self.coordinator.complete(self.token, success);
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("token", &self.token)
            .finish()
    }
}
