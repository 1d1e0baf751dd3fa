use std::{collections::HashMap, fs, path::Path, sync::Arc};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, TutorChatError};

/// Which header carries the API key. Deployments differ: the relay endpoint
/// expects `x-api-key`, the edge-function endpoint expects `apikey`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyHeader {
    XApiKey,
    Apikey,
}

impl KeyHeader {
    pub fn name(&self) -> &'static str {
        match self {
            KeyHeader::XApiKey => "x-api-key",
            KeyHeader::Apikey => "apikey",
        }
    }
}

/// Request-body dialect of a flow. The two chat surfaces share the whole
/// streaming pipeline and differ only in how the POST body is shaped.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    /// `{messages, class_id, persona, cohort_id, file_content?}`
    Tutor,
    /// `{messages, mode, selectedCourse, selectedLecture, session_id, ...}`
    Professor,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FlowCfg {
    /// Chat endpoint URL, e.g. `https://.../api/chat`.
    pub chat_url: String,
    /// Name of the environment variable that contains the API key.
    pub api_key_env: String,
    pub key_header: KeyHeader,
    pub shape: PayloadShape,
    /// Send the cohort as an `x-cohort-id` header in addition to the body.
    #[serde(default)]
    pub cohort_header: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Flows {
    pub tutor: Option<FlowCfg>,
    pub professor: Option<FlowCfg>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 120000ms; streams are
    /// long-lived)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub flows: Flows,
    /// HTTP client configuration (timeouts, pooling). Missing in older configs → defaults.
    #[serde(default)]
    pub http: HttpCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(TutorChatError::from)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| TutorChatError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                serde_json::from_str::<Self>(s).map_err(|e| TutorChatError::Other(e.into()))?
            }
            Some("toml") => {
                toml::from_str::<Self>(s).map_err(|e| TutorChatError::Other(e.into()))?
            }
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| TutorChatError::Other(e.into()))
                .or_else(|_| {
                    toml::from_str::<Self>(s).map_err(|e| TutorChatError::Other(e.into()))
                })?,
        };
        Ok(cfg)
    }
}

/// A configured chat flow with its key resolved, ready for the session
/// controller.
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    pub cfg: FlowCfg,
    pub api_key: SecretString,
}

/// Registry of usable flows by name ("tutor", "professor"). A flow whose key
/// environment variable is unset is left unregistered rather than failing the
/// whole config.
#[derive(Debug)]
pub struct FlowRegistry {
    flows: HashMap<String, Arc<Flow>>,
}

impl FlowRegistry {
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        let mut flows: HashMap<String, Arc<Flow>> = HashMap::new();
        let entries = [("tutor", &cfg.flows.tutor), ("professor", &cfg.flows.professor)];
        for (name, flow_cfg) in entries {
            let Some(flow_cfg) = flow_cfg else { continue };
            if flow_cfg.chat_url.is_empty() {
                return Err(TutorChatError::Validation(format!(
                    "flow '{name}' has an empty chat_url"
                )));
            }
            let Ok(key) = std::env::var(&flow_cfg.api_key_env) else {
                continue;
            };
            flows.insert(
                name.to_string(),
                Arc::new(Flow {
                    name: name.to_string(),
                    cfg: flow_cfg.clone(),
                    api_key: SecretString::new(key.into()),
                }),
            );
        }
        Ok(Self { flows })
    }

    /// Test-and-embedding helper: build a registry out of ready-made flows
    /// without touching the process environment.
    pub fn with_flows(flows: Vec<Flow>) -> Self {
        Self {
            flows: flows
                .into_iter()
                .map(|f| (f.name.clone(), Arc::new(f)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Flow>> {
        self.flows.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.flows.keys().map(String::as_str).collect()
    }
}
