//! Relay Pair Registry
//!
//! Instance-owned table of active relay pairs. Each pair gets a
//! [`PairHandle`] whose cancellation token stops the pair task; tearing a
//! pair down removes it exactly once no matter how many times it is asked.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::metrics;

/// Why a pair was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownReason {
    /// The viewer closed its socket.
    DownstreamClosed,
    /// The viewer socket failed.
    DownstreamError,
    /// The source closed the upstream socket.
    UpstreamClosed,
    /// The upstream socket failed after opening.
    UpstreamError,
    /// The upstream could not be opened.
    UpstreamUnavailable,
    /// The relay is shutting down.
    Shutdown,
    /// The pair handle was dropped without an explicit teardown.
    Dropped,
}

impl TeardownReason {
    /// Metric label value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DownstreamClosed => "downstream_closed",
            Self::DownstreamError => "downstream_error",
            Self::UpstreamClosed => "upstream_closed",
            Self::UpstreamError => "upstream_error",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Shutdown => "shutdown",
            Self::Dropped => "dropped",
        }
    }
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time relay counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Pairs currently registered.
    pub active_pairs: usize,
    /// Pairs registered since start.
    pub accepted: u64,
    /// Pairs torn down since start.
    pub torn_down: u64,
    /// Failed upstream opens since start.
    pub upstream_failures: u64,
    /// Whether the most recent upstream open failed.
    pub last_upstream_failed: bool,
}

#[derive(Debug)]
struct PairEntry {
    peer: Option<SocketAddr>,
    registered_at: Instant,
    cancel: CancellationToken,
}

/// Registry of active relay pairs.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    pairs: Mutex<HashMap<Uuid, PairEntry>>,
    accepted: AtomicU64,
    torn_down: AtomicU64,
    upstream_failures: AtomicU64,
    last_upstream_failed: AtomicBool,
}

impl RelayRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pair whose token is a child of `parent`.
    #[must_use]
    pub fn register(
        self: &Arc<Self>,
        peer: Option<SocketAddr>,
        parent: &CancellationToken,
    ) -> PairHandle {
        let id = Uuid::new_v4();
        let cancel = parent.child_token();

        let active = {
            let mut pairs = self.pairs.lock();
            pairs.insert(
                id,
                PairEntry {
                    peer,
                    registered_at: Instant::now(),
                    cancel: cancel.clone(),
                },
            );
            pairs.len()
        };

        self.accepted.fetch_add(1, Ordering::Relaxed);
        metrics::record_pair_accepted();
        metrics::set_active_pairs(active);
        tracing::debug!(pair_id = %id, peer = ?peer, active, "Relay pair registered");

        PairHandle {
            id,
            registry: Arc::clone(self),
            cancel,
        }
    }

    /// Remove a pair and cancel its task.
    ///
    /// Returns `true` only for the call that actually removed it.
    pub fn teardown(&self, id: Uuid, reason: TeardownReason) -> bool {
        let (entry, active) = {
            let mut pairs = self.pairs.lock();
            let entry = pairs.remove(&id);
            (entry, pairs.len())
        };

        let Some(entry) = entry else {
            return false;
        };

        entry.cancel.cancel();
        self.torn_down.fetch_add(1, Ordering::Relaxed);
        metrics::record_teardown(reason.as_str());
        metrics::set_active_pairs(active);
        tracing::info!(
            pair_id = %id,
            peer = ?entry.peer,
            reason = %reason,
            lifetime_ms = entry.registered_at.elapsed().as_millis(),
            active,
            "Relay pair torn down"
        );
        true
    }

    /// Tear down every registered pair. Returns how many were removed.
    pub fn teardown_all(&self, reason: TeardownReason) -> usize {
        let ids: Vec<Uuid> = self.pairs.lock().keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.teardown(*id, reason))
            .count()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: Uuid) -> bool {
        self.pairs.lock().contains_key(&id)
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn active(&self) -> usize {
        self.pairs.lock().len()
    }

    /// Record the outcome of an upstream open.
    pub fn record_upstream_open(&self, ok: bool) {
        self.last_upstream_failed.store(!ok, Ordering::Relaxed);
        if !ok {
            self.upstream_failures.fetch_add(1, Ordering::Relaxed);
            metrics::record_upstream_failure();
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            active_pairs: self.active(),
            accepted: self.accepted.load(Ordering::Relaxed),
            torn_down: self.torn_down.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            last_upstream_failed: self.last_upstream_failed.load(Ordering::Relaxed),
        }
    }
}

/// Registry membership of one pair. Dropping it tears the pair down.
#[derive(Debug)]
pub struct PairHandle {
    id: Uuid,
    registry: Arc<RelayRegistry>,
    cancel: CancellationToken,
}

impl PairHandle {
    /// Pair id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Token cancelled when the pair is torn down or the relay shuts down.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Tear this pair down. Returns `true` if this call removed it.
    pub fn teardown(&self, reason: TeardownReason) -> bool {
        self.registry.teardown(self.id, reason)
    }
}

impl Drop for PairHandle {
    fn drop(&mut self) {
        self.registry.teardown(self.id, TeardownReason::Dropped);
    }
}
