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

//! CLI wiring for the strata mover binary.
//!
//! Layout: `cli.rs` (argument surface), `lock.rs` (single-instance guard),
//! `logging.rs` (subscriber setup), `run.rs` (per-mapping orchestration).

pub mod cli;
pub mod error;
pub mod lock;
pub mod logging;
pub mod run;

pub use cli::Cli;
pub use error::{AppError, AppResult};
pub use lock::PidLock;
pub use run::run;
