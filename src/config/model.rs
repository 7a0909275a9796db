// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::NodeType;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// simulated_delay_ms = 300
/// event_buffer = 256
/// stream_idle_timeout_secs = 120
///
/// [remote]
/// endpoint = "http://127.0.0.1:8000/api/workflows/stream"
/// workflow_type = "full_analysis"
///
/// [reconciler.keywords]
/// profile_table = "data_source"
/// generate_insights = "insight_extractor"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub reconciler: ReconcilerSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Artificial delay of the simulated local executors.
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,

    /// Capacity of the observer broadcast channel and the runtime queue.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// A remote stream silent for this long counts as disconnected.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

fn default_simulated_delay_ms() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    256
}

fn default_stream_idle_timeout_secs() -> u64 {
    120
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            simulated_delay_ms: default_simulated_delay_ms(),
            event_buffer: default_event_buffer(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

/// `[remote]` section: where remote jobs are started.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
}

fn default_workflow_type() -> String {
    "full_analysis".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            workflow_type: default_workflow_type(),
        }
    }
}

/// `[reconciler]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReconcilerSection {
    /// Keyword to node type name. `None` means the built-in table.
    #[serde(default)]
    pub keywords: Option<BTreeMap<String, String>>,
}

/// Validated configuration. Only built through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    simulated_delay: Duration,
    event_buffer: usize,
    stream_idle_timeout: Duration,
    endpoint: Option<String>,
    workflow_type: String,
    keywords: Option<Vec<(String, NodeType)>>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        engine: EngineSection,
        remote: RemoteSection,
        keywords: Option<Vec<(String, NodeType)>>,
    ) -> Self {
        Self {
            simulated_delay: Duration::from_millis(engine.simulated_delay_ms),
            event_buffer: engine.event_buffer,
            stream_idle_timeout: Duration::from_secs(engine.stream_idle_timeout_secs),
            endpoint: remote.endpoint,
            workflow_type: remote.workflow_type,
            keywords,
        }
    }

    pub fn simulated_delay(&self) -> Duration {
        self.simulated_delay
    }

    pub fn event_buffer(&self) -> usize {
        self.event_buffer
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Configured keyword bindings, or `None` to use the built-in table.
    pub fn keywords(&self) -> Option<&[(String, NodeType)]> {
        self.keywords.as_deref()
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(EngineSection::default(), RemoteSection::default(), None)
    }
}
