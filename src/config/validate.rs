// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{InsightdagError, Result};
use crate::stream::correlate::keyword_pattern;
use crate::types::NodeType;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = InsightdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_engine(&raw)?;
        validate_remote(&raw)?;
        let keywords = validate_keywords(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, raw.remote, keywords))
    }
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    if cfg.engine.event_buffer == 0 {
        return Err(InsightdagError::ConfigError(
            "[engine].event_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.engine.stream_idle_timeout_secs == 0 {
        return Err(InsightdagError::ConfigError(
            "[engine].stream_idle_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_remote(cfg: &RawConfigFile) -> Result<()> {
    if cfg.remote.workflow_type.trim().is_empty() {
        return Err(InsightdagError::ConfigError(
            "[remote].workflow_type must not be empty".to_string(),
        ));
    }
    if let Some(endpoint) = &cfg.remote.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(InsightdagError::ConfigError(format!(
                "[remote].endpoint must be an http(s) URL (got '{endpoint}')"
            )));
        }
    }
    Ok(())
}

fn validate_keywords(cfg: &RawConfigFile) -> Result<Option<Vec<(String, NodeType)>>> {
    let Some(table) = &cfg.reconciler.keywords else {
        return Ok(None);
    };

    let mut bindings = Vec::with_capacity(table.len());
    for (keyword, target) in table {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(InsightdagError::ConfigError(
                "[reconciler.keywords] contains an empty keyword".to_string(),
            ));
        }

        let node_type: NodeType = target.parse().map_err(|e| {
            InsightdagError::ConfigError(format!(
                "[reconciler.keywords].{keyword}: {e}"
            ))
        })?;

        keyword_pattern(keyword).map_err(|e| {
            InsightdagError::ConfigError(format!(
                "[reconciler.keywords].{keyword}: invalid keyword: {e}"
            ))
        })?;

        bindings.push((keyword.to_string(), node_type));
    }

    Ok(Some(bindings))
}
