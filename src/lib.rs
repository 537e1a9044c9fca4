//! Core reconciliation engine for a bidirectional folder synchronizer
//! with distributed per-file history.
//!
//! Each replica keeps, per tracked path, an append-only list of the
//! versions that path has ever held there (see [`model`]). Reconciling
//! two replicas (see [`reconcile`]) never rewrites that history — it
//! only ever appends the other side's unseen versions, in an order that
//! stays stable no matter how many times or in what order replicas are
//! compared (see [`merge`]).
//!
//! This crate owns the algebra: what a history is, how two histories
//! merge, and which direction a transfer should go. It does not own a
//! filesystem, a CLI, or a trash folder — those are external
//! collaborators built on the [`source::Source`] trait.

pub mod config;
pub mod error;
pub mod index;
pub mod memory_source;
pub mod merge;
pub mod model;
pub mod reconcile;
pub mod source;

pub use config::ReconcileOptions;
pub use error::{BisyncError, BisyncResult};
pub use index::{build_index, load_index, persist_index, sweep_stale_staging, Index};
pub use memory_source::MemorySource;
pub use merge::merge as merge_histories;
pub use model::{Entry, History};
pub use reconcile::{synchronize_all, Replica};
pub use source::{AlwaysConfirm, ConfirmationPolicy, Source};
