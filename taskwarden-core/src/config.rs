use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ─── Config Types ────────────────────────────────────────────────────────────

/// How long an inactive record may sit untouched before the initialize-time
/// sweep removes it: 30 days.
pub const DEFAULT_STALE_RECORD_AGE_MS: u64 = 30 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_record_age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prune_stale_records: Option<bool>,
}

impl CoordinatorConfig {
    pub fn stale_record_age_ms(&self) -> u64 {
        self.stale_record_age_ms.unwrap_or(DEFAULT_STALE_RECORD_AGE_MS)
    }

    pub fn prune_stale_records(&self) -> bool {
        self.prune_stale_records.unwrap_or(true)
    }
}

// ─── Config Format ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Environment Variable Interpolation ──────────────────────────────────────

/// Replace `${VAR_NAME}` patterns in a string with environment variable values.
/// If the environment variable is not set, the original `${VAR_NAME}` is kept.
pub fn interpolate_env_vars(value: &str) -> String {
    let re = Regex::new(r"\$\{([^}]+)\}").expect("invalid regex");
    re.replace_all(value, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Recursively interpolate environment variables in a serde_json::Value tree.
/// Strings get `${VAR}` replacement; arrays and objects are traversed recursively;
/// other types (numbers, booleans, null) pass through unchanged.
fn interpolate_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(interpolate_env_vars(&s)),
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(interpolate_value).collect())
        }
        serde_json::Value::Object(map) => {
            serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, interpolate_value(v))).collect())
        }
        other => other,
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a config string in the given format, with environment variable interpolation.
///
/// - **YAML**: env vars are interpolated in the raw string *before* YAML parsing.
/// - **JSON**: the string is parsed first, then env vars are interpolated in values.
///
/// After interpolation, if `staleRecordAgeMs` ended up as a string (from env
/// var substitution), it is coerced to a number. If coercion fails, the field
/// is cleared.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<CoordinatorConfig, ConfigError> {
    let raw: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => {
            let interpolated = interpolate_env_vars(content);
            let parsed: serde_json::Value = serde_yaml::from_str(&interpolated)?;
            // Empty YAML content parses to null; treat as empty config
            if parsed.is_null() {
                return Ok(CoordinatorConfig::default());
            }
            parsed
        }
    };

    let interpolated = interpolate_value(raw);

    let final_value = coerce_stale_record_age(interpolated);

    let config: CoordinatorConfig =
        serde_json::from_value(final_value).map_err(ConfigError::JsonParse)?;
    Ok(config)
}

/// If the `staleRecordAgeMs` field is a JSON string, attempt to parse it as an
/// integer. If parsing succeeds, replace it with the numeric value.
/// If parsing fails, remove the field entirely.
fn coerce_stale_record_age(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(ref mut map) = value {
        if let Some(age_val) = map.get("staleRecordAgeMs") {
            if let serde_json::Value::String(s) = age_val {
                match s.parse::<u64>() {
                    Ok(n) => {
                        map.insert(
                            "staleRecordAgeMs".to_string(),
                            serde_json::Value::Number(n.into()),
                        );
                    }
                    Err(_) => {
                        map.remove("staleRecordAgeMs");
                    }
                }
            }
        }
    }
    value
}

// ─── File Loading ────────────────────────────────────────────────────────────

/// Default config file candidate names, checked in order.
const DEFAULT_CANDIDATES: &[&str] = &[
    "taskwarden.config.yaml",
    "taskwarden.config.yml",
    "taskwarden.config.json",
];

/// Load a config file from disk. If `config_path` is provided, only that path
/// is tried. Otherwise, a list of default candidates is checked in order
/// relative to the current working directory.
///
/// If no matching file is found, returns a default (empty) config.
pub fn load_config_file(config_path: Option<&str>) -> Result<CoordinatorConfig, ConfigError> {
    let base_dir = std::env::current_dir()?;
    load_config_file_from_dir(config_path, &base_dir)
}

/// Internal: load config searching from a specific base directory.
fn load_config_file_from_dir(
    config_path: Option<&str>,
    base_dir: &Path,
) -> Result<CoordinatorConfig, ConfigError> {
    let candidates: Vec<&str> = match config_path {
        Some(path) => vec![path],
        None => DEFAULT_CANDIDATES.to_vec(),
    };

    for candidate in candidates {
        let full_path = if Path::new(candidate).is_absolute() {
            std::path::PathBuf::from(candidate)
        } else {
            base_dir.join(candidate)
        };

        if !full_path.exists() {
            continue;
        }

        let ext = full_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = std::fs::read_to_string(&full_path)?;
        let format = if ext == "json" {
            ConfigFormat::Json
        } else {
            ConfigFormat::Yaml
        };

        return parse_config(&content, format);
    }

    Ok(CoordinatorConfig::default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
