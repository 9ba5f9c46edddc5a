//! Long-lived services wired up by `main`: the reconciler (C7).

pub mod drs_ruler;

pub use drs_ruler::DrsRuler;
