//! A small settings struct for reconciliation runs.
//!
//! `fspulse::config` is a large layered-config module built around
//! `figment` (toml file + env overrides + per-field provenance) for a
//! standalone CLI application with its own on-disk config directory. None
//! of that applies to a library with no CLI and no application config
//! directory of its own (see DESIGN.md, "Dropped from the teacher"). What
//! carries over is the smaller pattern every config type in this crate
//! (and in `fspulse`) follows: a plain `serde`-derived struct with a
//! `Default` impl supplying the documented defaults.

use serde::{Deserialize, Serialize};

/// Options controlling one `synchronize_all` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Whether `ConfirmationPolicy` is actually consulted before a
    /// transfer. When `false`, every transfer proceeds as if the policy
    /// had answered `true` — this is the "fully automatic" default
    /// spec §4.5 describes, expressed as a config knob rather than a
    /// different trait impl so an embedder can flip it without writing
    /// its own policy type.
    pub confirm_transfers: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            confirm_transfers: false,
        }
    }
}
