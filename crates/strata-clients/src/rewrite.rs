//! Prefix substitution between host paths and an external service's view.

use std::path::{Path, PathBuf};

use strata_config::RewriteRule;

/// Bidirectional path translation derived from a configured rewrite rule.
///
/// `from` is the prefix as the external service sees it; `to` is the
/// corresponding prefix on the scanned filesystem. Without a rule the mapper
/// is the identity. Conversion is only defined for paths rooted under the
/// relevant prefix; other inputs pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct PathRewriter {
    rule: Option<RewriteRule>,
}

impl PathRewriter {
    /// Build a rewriter from an optional configured rule.
    #[must_use]
    pub const fn new(rule: Option<RewriteRule>) -> Self {
        Self { rule }
    }

    /// Translate a path from the external service's view onto the host.
    #[must_use]
    pub fn to_host(&self, external: &Path) -> PathBuf {
        match &self.rule {
            Some(rule) => external.strip_prefix(&rule.from).map_or_else(
                |_| external.to_path_buf(),
                |rel| Path::new(&rule.to).join(rel),
            ),
            None => external.to_path_buf(),
        }
    }

    /// Translate a host path into the external service's view.
    #[must_use]
    pub fn to_external(&self, host: &Path) -> PathBuf {
        match &self.rule {
            Some(rule) => host.strip_prefix(&rule.to).map_or_else(
                |_| host.to_path_buf(),
                |rel| Path::new(&rule.from).join(rel),
            ),
            None => host.to_path_buf(),
        }
    }
}
