//! Validation helpers applied after the document parses.

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Config, Mapping};

/// Validate an entire configuration document.
///
/// # Errors
///
/// Returns the first [`ConfigError::InvalidField`] encountered.
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    for mapping in &config.mappings {
        validate_mapping(mapping)?;
    }
    Ok(())
}

fn validate_mapping(mapping: &Mapping) -> ConfigResult<()> {
    if mapping.source.as_os_str().is_empty() {
        return Err(ConfigError::invalid("source", "cannot be empty", None));
    }
    if mapping.destination.as_os_str().is_empty() {
        return Err(ConfigError::invalid("destination", "cannot be empty", None));
    }
    if mapping.source == mapping.destination {
        return Err(ConfigError::invalid(
            "destination",
            "must differ from source",
            Some(mapping.destination.display().to_string()),
        ));
    }
    validate_percent("threshold", mapping.threshold)?;
    if let Some(cache_threshold) = mapping.cache_threshold {
        validate_percent("cache_threshold", cache_threshold)?;
    }
    if let Some(max_age) = mapping.max_age
        && max_age < mapping.min_age
    {
        return Err(ConfigError::invalid(
            "max_age",
            "must not be below min_age",
            Some(humantime::format_duration(max_age).to_string()),
        ));
    }
    for client in &mapping.clients {
        if client.host.trim().is_empty() {
            return Err(ConfigError::invalid("clients.host", "cannot be empty", None));
        }
    }
    for media in &mapping.media {
        if media.url.trim().is_empty() {
            return Err(ConfigError::invalid("media.url", "cannot be empty", None));
        }
    }
    Ok(())
}

fn validate_percent(field: &'static str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            "must be a percentage between 0 and 100",
            Some(value.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(doc: &str) -> Mapping {
        serde_yaml::from_str(doc).expect("mapping parses")
    }

    #[test]
    fn accepts_minimal_mapping() {
        let parsed = mapping("source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 70\n");
        assert!(validate_mapping(&parsed).is_ok());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let parsed = mapping("source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 170\n");
        let err = validate_mapping(&parsed).expect_err("threshold must be rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidField { field: "threshold", .. }
        ));
    }

    #[test]
    fn rejects_identical_roots() {
        let parsed = mapping("source: /mnt/cache\ndestination: /mnt/cache\nthreshold: 70\n");
        let err = validate_mapping(&parsed).expect_err("identical roots must be rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidField { field: "destination", .. }
        ));
    }

    #[test]
    fn rejects_inverted_age_window() {
        let parsed = mapping(
            "source: /mnt/cache\ndestination: /mnt/archive\nthreshold: 70\nmin_age: 10d\nmax_age: 2d\n",
        );
        let err = validate_mapping(&parsed).expect_err("inverted window must be rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidField { field: "max_age", .. }
        ));
    }
}
