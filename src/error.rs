//! Crate-wide error taxonomy (spec.md §7).
//!
//! Event-handler and reconciler-pass internals generally log and continue
//! rather than propagate (see `services::drs_ruler` and `k8scache::dispatch`);
//! `Error` is used at the boundaries that must distinguish failure kinds:
//! the affinity-rule client and the extender's request decode path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network error reaching either backend. Retried on the next tick or
    /// the next request; never fatal.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// Type mismatch or missing field in an event payload. The event is
    /// dropped and logged.
    #[error("invariant broken: {0}")]
    InvariantBroken(String),

    /// `DuplicateName` on apply / `NotFound` on delete, both caused by the
    /// rule-view lagging behind the cluster (spec.md §4.5). Self-healing:
    /// the reconciler's next pass retries.
    #[error("rule conflict: {0}")]
    RuleConflict(#[from] RuleConflictKind),

    /// Malformed extender request. Surfaced to the caller as HTTP 400.
    #[error("client input error: {0}")]
    ClientInput(String),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RuleConflictKind {
    #[error("rule name already applied")]
    DuplicateName,
    #[error("rule name not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
