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

//! YAML-backed configuration for the mover engine.
//!
//! Layout: `model.rs` (typed mapping records), `loader.rs` (file loading and
//! secret resolution), `validate.rs` (field validation helpers).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use model::{
    Config, Mapping, MediaServerConfig, MediaServerKind, RewriteRule, TorrentClientConfig,
};
