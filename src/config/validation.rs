use super::models::Config;
use reqwest::Url;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid download.base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("download.max_body_bytes must be positive")]
    ZeroBodyLimit,

    #[error("download.max_retries must be at most {max}, got {value}")]
    TooManyRetries { value: u32, max: u32 },

    #[error("Remap rule for '{from}' has an empty target")]
    EmptyRemapTarget { from: String },

    #[error("Duplicate remap rule for '{from}'")]
    DuplicateRemap { from: String },

    #[error("Remap cycle detected: {path}")]
    RemapCycle { path: String },
}

/// Upper bound for `download.max_retries`
pub const MAX_RETRIES: u32 = 10;

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_base_url(config)?;
    validate_limits(config)?;
    validate_remap(config)?;
    Ok(())
}

fn validate_base_url(config: &Config) -> Result<(), ValidationError> {
    let url = &config.download.base_url;
    let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if parsed.cannot_be_a_base() {
        return Err(ValidationError::InvalidBaseUrl {
            url: url.clone(),
            reason: "URL cannot be used as a base".to_string(),
        });
    }

    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.download.connect_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "download.connect_timeout_ms",
        });
    }
    if config.download.request_timeout_ms == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "download.request_timeout_ms",
        });
    }
    if config.download.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroBodyLimit);
    }
    if config.download.max_retries > MAX_RETRIES {
        return Err(ValidationError::TooManyRetries {
            value: config.download.max_retries,
            max: MAX_RETRIES,
        });
    }
    Ok(())
}

/// Every remap chain must terminate
fn validate_remap(config: &Config) -> Result<(), ValidationError> {
    let mut table = BTreeMap::new();
    for rule in &config.content.remap {
        if rule.to.trim().is_empty() {
            return Err(ValidationError::EmptyRemapTarget {
                from: rule.from.clone(),
            });
        }
        if table.insert(rule.from.as_str(), rule.to.as_str()).is_some() {
            return Err(ValidationError::DuplicateRemap {
                from: rule.from.clone(),
            });
        }
    }

    for start in table.keys() {
        let mut visited = HashSet::new();
        let mut path = vec![*start];
        let mut current = *start;
        visited.insert(current);

        while let Some(&next) = table.get(current) {
            path.push(next);
            if !visited.insert(next) {
                return Err(ValidationError::RemapCycle {
                    path: path.join(" -> "),
                });
            }
            current = next;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemapRule;

    fn rule(from: &str, to: &str) -> RemapRule {
        RemapRule {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_relative_base_url_rejected() {
        let mut config = Config::default();
        config.download.base_url = "assets/".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBaseUrl { .. })
        ));

        config.download.base_url = "data:text/plain,hi".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = Config::default();
        config.download.request_timeout_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout { field: "download.request_timeout_ms" })
        ));

        let mut config = Config::default();
        config.download.max_body_bytes = crate::humanize::ByteSize(0);
        assert!(matches!(validate(&config), Err(ValidationError::ZeroBodyLimit)));
    }

    #[test]
    fn test_max_retries_bounded() {
        let mut config = Config::default();
        config.download.max_retries = MAX_RETRIES;
        assert!(validate(&config).is_ok());

        config.download.max_retries = 40;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::TooManyRetries { value: 40, max: MAX_RETRIES })
        ));
    }

    #[test]
    fn test_remap_chain_is_valid() {
        let mut config = Config::default();
        config.content.remap = vec![rule("a.png", "b.png"), rule("b.png", "c.png")];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_remap_self_cycle() {
        let mut config = Config::default();
        config.content.remap = vec![rule("a.png", "a.png")];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::RemapCycle { .. })
        ));
    }

    #[test]
    fn test_remap_indirect_cycle() {
        let mut config = Config::default();
        config.content.remap = vec![rule("a", "b"), rule("b", "c"), rule("c", "a")];
        match validate(&config) {
            Err(ValidationError::RemapCycle { path }) => assert_eq!(path, "a -> b -> c -> a"),
            other => panic!("expected RemapCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_remap_duplicate_and_empty() {
        let mut config = Config::default();
        config.content.remap = vec![rule("a", "b"), rule("a", "c")];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateRemap { .. })
        ));

        config.content.remap = vec![rule("a", " ")];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyRemapTarget { .. })
        ));
    }
}
