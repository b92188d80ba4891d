#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Threshold-driven eviction engine for a two-tier storage hierarchy.
//!
//! The controller drives one mapping at a time through repeated
//! scan → prioritize → move cycles: the scanner groups files by physical
//! identity, client enrichment attaches torrent references and watched
//! status, the prioritizer orders eligible hardlink groups, and the executor
//! relocates them with pause/resume coordination until the usage target is
//! met or candidates are exhausted.

pub mod controller;
pub mod enrich;
pub mod error;
pub mod model;
pub mod mover;
pub mod prioritize;
pub mod scanner;
pub mod usage;

pub use controller::{MappingReport, MoveLoopController, Phase};
pub use enrich::Enrichment;
pub use error::{EngineError, EngineResult};
pub use model::{EvictionCandidate, FileKey, FileRecord, HardlinkGroup, WatchedState};
pub use mover::MoveExecutor;
pub use prioritize::prioritize;
pub use scanner::{build_ignore_set, prune_empty_dirs, scan_groups};
pub use usage::{StatvfsProbe, UsageProbe, UsageSnapshot};
