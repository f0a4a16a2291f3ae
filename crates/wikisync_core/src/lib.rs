//! Mirrors a hierarchical Backlog-style wiki between the remote service, a
//! local folder-per-page tree, and a flat single-folder wiki.
//!
//! The pure pieces (`naming`, `notation`, `attachments`, `tree`, `marker`)
//! carry no I/O. `sync` and `flat` drive them against the [`remote::WikiApi`]
//! and [`filesystem::LocalStore`] seams.

pub mod attachments;
pub mod cancel;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod flat;
pub mod marker;
pub mod naming;
pub mod notation;
pub mod remote;
pub mod runtime;
pub mod sync;
pub mod tree;
