use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use costing_core::{default_log_level, HistoryRule, PersonKey, SchemaGeneration, SchemaProfile};

const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434/v1";
const DEFAULT_LLM_MODEL: &str = "qwen2.5";
const DEFAULT_LLM_API_KEY: &str = "ollama";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub schema_generation: SchemaGeneration,
    pub schema_profile_path: Option<PathBuf>,
    pub history_rule: Option<HistoryRule>,
    pub person_key: Option<PersonKey>,
    pub llm: LlmConfig,
    pub log_level: Option<String>,
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub system_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StartupError {}

impl ServerConfig {
    pub fn load() -> Result<Self, StartupError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var("COSTING_CONFIG_PATH") {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                let file_kv = parse_env_file(config_path)?;
                merged.extend(file_kv);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let bind_addr = parse_socket_addr(
            kv.get("COSTING_BIND_ADDR"),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
            "COSTING_BIND_ADDR",
        )?;
        let db_path = PathBuf::from(require_nonempty(kv, "COSTING_DB_PATH")?);

        let schema_generation = match optional(kv, "COSTING_SCHEMA_GENERATION") {
            None => SchemaGeneration::Current,
            Some(value) => value
                .parse::<SchemaGeneration>()
                .map_err(|err| invalid("COSTING_SCHEMA_GENERATION", err))?,
        };
        let history_rule = optional(kv, "COSTING_HISTORY_RULE")
            .map(|value| value.parse::<HistoryRule>())
            .transpose()
            .map_err(|err| invalid("COSTING_HISTORY_RULE", err))?;
        let person_key = optional(kv, "COSTING_PERSON_KEY")
            .map(|value| value.parse::<PersonKey>())
            .transpose()
            .map_err(|err| invalid("COSTING_PERSON_KEY", err))?;

        let llm = LlmConfig {
            base_url: optional(kv, "COSTING_LLM_BASE_URL")
                .unwrap_or(DEFAULT_LLM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: optional(kv, "COSTING_LLM_MODEL")
                .unwrap_or(DEFAULT_LLM_MODEL)
                .to_string(),
            api_key: optional(kv, "COSTING_LLM_API_KEY")
                .unwrap_or(DEFAULT_LLM_API_KEY)
                .to_string(),
            timeout: Duration::from_secs(parse_u64(
                kv.get("COSTING_LLM_TIMEOUT_SECS"),
                DEFAULT_LLM_TIMEOUT_SECS,
                "COSTING_LLM_TIMEOUT_SECS",
            )?),
            system_prompt: optional(kv, "COSTING_SYSTEM_PROMPT")
                .unwrap_or(DEFAULT_SYSTEM_PROMPT)
                .to_string(),
        };
        if llm.timeout.is_zero() {
            return Err(StartupError {
                code: "ERR_INVALID_CONFIG",
                message: "COSTING_LLM_TIMEOUT_SECS must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            db_path,
            schema_generation,
            schema_profile_path: optional(kv, "COSTING_SCHEMA_PROFILE_PATH").map(PathBuf::from),
            history_rule,
            person_key,
            llm,
            log_level: optional(kv, "COSTING_LOG_LEVEL").map(str::to_string),
            log_dir: optional(kv, "COSTING_LOG_DIR").map(str::to_string),
        })
    }

    /// Builds the schema profile: the JSON file when configured, else the
    /// generation preset, then per-field overrides.
    pub fn schema_profile(&self) -> Result<SchemaProfile, StartupError> {
        let mut profile = match &self.schema_profile_path {
            Some(path) => SchemaProfile::load_json(path).map_err(|err| StartupError {
                code: "ERR_SCHEMA_PROFILE",
                message: err.to_string(),
            })?,
            None => SchemaProfile::for_generation(self.schema_generation),
        };
        if let Some(rule) = self.history_rule {
            profile.history_rule = rule;
        }
        if let Some(key) = self.person_key {
            profile.person_key = key;
        }
        Ok(profile)
    }

    /// Configured log level, else the build-mode default.
    pub fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, StartupError> {
    let contents = std::fs::read_to_string(path).map_err(|_| StartupError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {}", path),
    })?;

    let mut kv = HashMap::new();

    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| StartupError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(StartupError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        kv.insert(key.to_string(), strip_quotes(value.trim()));
    }

    Ok(kv)
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return s[1..bytes.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn optional<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn invalid(key: &'static str, err: impl std::fmt::Display) -> StartupError {
    StartupError {
        code: "ERR_INVALID_CONFIG",
        message: format!("{}: {}", key, err),
    }
}

fn require_nonempty(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<String, StartupError> {
    optional(kv, key)
        .map(str::to_string)
        .ok_or_else(|| StartupError {
            code: "ERR_MISSING_CONFIG",
            message: format!("missing required config key {}", key),
        })
}

fn parse_socket_addr(
    value: Option<&String>,
    default: SocketAddr,
    key: &'static str,
) -> Result<SocketAddr, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<SocketAddr>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be a valid host:port socket address", key),
        }),
    }
}

fn parse_u64(value: Option<&String>, default: u64, key: &'static str) -> Result<u64, StartupError> {
    match value {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => v.trim().parse::<u64>().map_err(|_| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: format!("{} must be an integer", key),
        }),
    }
}
