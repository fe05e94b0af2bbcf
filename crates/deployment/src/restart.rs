//! Restart debouncing and gating
//!
//! Multiple restart triggers inside one flow must collapse into a single
//! actual restart, and callers need a critical section during which no
//! restart may happen. The disallow gate is reentrant: N `disallow` calls
//! require N `allow` calls before a restart can proceed. A restart that
//! arrives while the gate is closed is queued, together with its pending
//! condition, and performed by the matching `allow`.

use crate::platform::PlatformHooks;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use updraft_errors::Error;
use updraft_events::{AppEvent, EventEmitter, EventSender};

const QUEUE_EMPTY: u8 = 0;
const QUEUE_IF_PENDING: u8 = 1;
const QUEUE_ALWAYS: u8 = 2;

pub struct RestartManager {
    platform: Arc<dyn PlatformHooks>,
    disallow_depth: AtomicUsize,
    /// Restart suppressed by the gate, ordered so an unconditional
    /// request outranks a pending-only one
    queued: AtomicU8,
    restarted: AtomicBool,
    tx: Option<EventSender>,
}

impl EventEmitter for RestartManager {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl RestartManager {
    #[must_use]
    pub fn new(platform: Arc<dyn PlatformHooks>, tx: Option<EventSender>) -> Self {
        Self {
            platform,
            disallow_depth: AtomicUsize::new(0),
            queued: AtomicU8::new(QUEUE_EMPTY),
            restarted: AtomicBool::new(false),
            tx,
        }
    }

    /// Trigger a restart unless gated, debounced, or conditioned on a
    /// pending update that does not exist. Returns whether the restart
    /// action was invoked.
    ///
    /// # Errors
    /// Returns an error if the platform restart hook fails.
    pub fn restart_if_allowed(
        &self,
        only_if_update_pending: bool,
        update_is_pending: bool,
    ) -> Result<bool, Error> {
        if only_if_update_pending && !update_is_pending {
            return Ok(false);
        }

        if self.disallow_depth.load(Ordering::SeqCst) > 0 {
            let slot = if only_if_update_pending {
                QUEUE_IF_PENDING
            } else {
                QUEUE_ALWAYS
            };
            self.queued.fetch_max(slot, Ordering::SeqCst);
            self.emit(AppEvent::RestartSuppressed);
            return Ok(false);
        }

        self.perform(only_if_update_pending)
    }

    /// Close the restart gate. Nestable.
    pub fn disallow(&self) {
        self.disallow_depth.fetch_add(1, Ordering::SeqCst);
    }

    /// Reopen the restart gate. The `allow` that fully reopens the gate
    /// performs a restart that was queued while it was closed, re-checking
    /// a pending-only request against `update_is_pending` now — the update
    /// it was conditioned on may have been rolled back in the meantime.
    /// Returns whether a queued restart was invoked.
    ///
    /// # Errors
    /// Returns an error if the platform restart hook fails.
    pub fn allow(&self, update_is_pending: bool) -> Result<bool, Error> {
        let depth = self.disallow_depth.load(Ordering::SeqCst);
        if depth == 0 {
            return Ok(false);
        }
        if self.disallow_depth.fetch_sub(1, Ordering::SeqCst) != 1 {
            return Ok(false);
        }

        match self.queued.swap(QUEUE_EMPTY, Ordering::SeqCst) {
            QUEUE_ALWAYS => self.perform(false),
            QUEUE_IF_PENDING if update_is_pending => self.perform(true),
            _ => Ok(false),
        }
    }

    /// Whether a restart has already been initiated by this manager.
    #[must_use]
    pub fn restart_initiated(&self) -> bool {
        self.restarted.load(Ordering::SeqCst)
    }

    fn perform(&self, only_if_update_pending: bool) -> Result<bool, Error> {
        // Debounce: once a restart is on its way, further triggers are
        // no-ops until the process actually goes down.
        if self.restarted.swap(true, Ordering::SeqCst) {
            self.emit(AppEvent::RestartSuppressed);
            return Ok(false);
        }

        self.emit(AppEvent::RestartRequested {
            only_if_update_pending,
        });
        self.platform.perform_restart()?;
        Ok(true)
    }
}
