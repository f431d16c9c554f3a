//! Multi-tier TOML configuration for Parley.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use parley_api::{ProviderKind, ProviderRegistry, ProviderSettings, TemperaturePolicy};
use parley_types::{ConfigError, ProviderModelRef};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The default listen address for the relay server.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// The default relay server URL used by the client.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// The default model selected by the client.
pub const DEFAULT_MODEL: &str = "openai:gpt-5-mini";

/// The default max tokens for a response.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// The fallback sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Seconds to wait for the next upstream delta before giving up.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

const DEFAULT_MODELS: &[&str] = &[
    "openai:gpt-5-nano",
    "openai:gpt-5-mini",
    "openai:gpt-5",
    "openrouter:deepseek/deepseek-chat",
    "openrouter:x-ai/grok-4.1-fast",
    "openrouter:openai/gpt-4o-mini",
    "openrouter:mistralai/mistral-large-2512",
    "groq:llama-3.1-8b-instant",
    "groq:llama-3.3-70b-versatile",
    "anthropic:claude-sonnet-4-6",
    "anthropic:claude-opus-4-6",
    "anthropic:claude-haiku-4-5",
    "gemini:models/gemini-2.5-flash-lite",
    "gemini:models/gemini-2.5-flash",
    "demo:echo",
];

const DEFAULT_TEMPERATURES: &[(&str, f32)] = &[
    ("openrouter:deepseek/deepseek-chat", 0.7),
    ("openrouter:x-ai/grok-4.1-fast", 0.7),
    ("openrouter:openai/gpt-4o-mini", 0.7),
    ("openrouter:mistralai/mistral-large-2512", 0.6),
    ("groq:llama-3.1-8b-instant", 0.7),
    ("groq:llama-3.3-70b-versatile", 0.7),
    ("anthropic:claude-sonnet-4-6", 0.6),
    ("anthropic:claude-opus-4-6", 0.6),
    ("anthropic:claude-haiku-4-5", 0.7),
    ("gemini:models/gemini-2.5-flash-lite", 0.7),
    ("gemini:models/gemini-2.5-flash", 0.7),
];

const DEFAULT_NO_TEMPERATURE: &[&str] = &["gpt-5", "gpt-5-mini", "gpt-5-nano"];

/// Resolved configuration for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub config_dir: PathBuf,
    pub bind: String,
    pub allowed_origins: Vec<String>,
    pub data_dir: PathBuf,
    pub max_tokens: u32,
    /// `None` disables the upstream idle timeout.
    pub upstream_idle_timeout: Option<Duration>,
    pub models: Vec<ProviderModelRef>,
    pub temperatures: TemperaturePolicy,
    pub providers: HashMap<ProviderKind, ProviderSettings>,
    /// Bearer credential -> user id.
    pub auth_tokens: HashMap<String, String>,
}

/// Resolved configuration for the interactive client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub config_dir: PathBuf,
    pub server_url: String,
    pub token: Option<String>,
    pub model: String,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub providers: HashMap<String, ProviderFileSettings>,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    pub default_temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub upstream_idle_timeout_secs: Option<u64>,
    pub models: Option<Vec<String>>,
    #[serde(default)]
    pub temperatures: HashMap<String, f32>,
    pub no_temperature: Option<Vec<String>>,
}

/// One `[providers.<key>]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderFileSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Sent as `HTTP-Referer` (OpenRouter attribution).
    pub referer: Option<String>,
    /// Sent as `X-Title` (OpenRouter attribution).
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientSettings {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub model: Option<String>,
}

/// Server CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub bind: Option<String>,
    pub data_dir: Option<PathBuf>,
    /// Extra `(credential, user_id)` pairs added to the token table.
    pub auth_tokens: Vec<(String, String)>,
}

/// Client CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ClientOverrides {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub model: Option<String>,
}

impl ServerConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.parley/config.toml)
    /// 4. Defaults
    pub fn load(overrides: ServerOverrides) -> Result<Self, ConfigError> {
        Self::load_from(config_dir(), overrides, &|key| std::env::var(key).ok())
    }

    /// [`ServerConfig::load`] with an explicit config directory and env lookup.
    pub fn load_from(
        config_dir: PathBuf,
        overrides: ServerOverrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let settings = load_settings_file(&config_dir.join("config.toml"));

        let bind = overrides
            .bind
            .or_else(|| env("PARLEY_BIND"))
            .or(settings.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let data_dir = overrides
            .data_dir
            .or_else(|| env("PARLEY_DATA_DIR").map(PathBuf::from))
            .or(settings.server.data_dir)
            .unwrap_or_else(|| config_dir.join("chats"));

        let allowed_origins = settings.server.allowed_origins.unwrap_or_else(|| {
            DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let max_tokens = settings.relay.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "relay.max_tokens".into(),
                message: "must be greater than zero".into(),
            });
        }

        let idle_secs = settings
            .relay
            .upstream_idle_timeout_secs
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        let upstream_idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        let models = match &settings.relay.models {
            Some(models) => models
                .iter()
                .map(|m| ProviderModelRef::parse(m))
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_MODELS
                .iter()
                .map(|m| ProviderModelRef::parse(m))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let temperatures = temperature_policy(settings.relay)?;
        let providers = provider_settings(settings.providers, env);

        let mut auth_tokens = settings.auth.tokens;
        auth_tokens.extend(overrides.auth_tokens);
        if auth_tokens.is_empty() {
            tracing::warn!("No auth tokens configured; every /v1 request will be rejected");
        }

        Ok(ServerConfig {
            config_dir,
            bind,
            allowed_origins,
            data_dir,
            max_tokens,
            upstream_idle_timeout,
            models,
            temperatures,
            providers,
            auth_tokens,
        })
    }

    /// Build the provider registry described by this configuration.
    pub fn registry(&self, http: reqwest::Client) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(http);
        for (kind, settings) in &self.providers {
            registry.register_builtin(*kind, settings.clone());
        }
        let registry = registry.with_temperatures(self.temperatures.clone());
        if self.models.is_empty() {
            registry
        } else {
            registry.with_allowed_models(self.models.clone())
        }
    }
}

impl ClientConfig {
    /// Load client configuration (CLI > env > `[client]` section > defaults).
    pub fn load(overrides: ClientOverrides) -> Self {
        Self::load_from(config_dir(), overrides, &|key| std::env::var(key).ok())
    }

    pub fn load_from(
        config_dir: PathBuf,
        overrides: ClientOverrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let settings = load_settings_file(&config_dir.join("config.toml")).client;

        let server_url = overrides
            .server_url
            .or_else(|| env("PARLEY_SERVER_URL"))
            .or(settings.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let token = overrides
            .token
            .or_else(|| env("PARLEY_TOKEN"))
            .or(settings.token)
            .filter(|t| !t.trim().is_empty());
        let model = overrides
            .model
            .or_else(|| env("PARLEY_MODEL"))
            .or(settings.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        ClientConfig {
            config_dir,
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
            model,
        }
    }
}

fn temperature_policy(relay: RelaySettings) -> Result<TemperaturePolicy, ConfigError> {
    let check = |key: String, value: f32| {
        if TemperaturePolicy::RANGE.contains(&value) {
            Ok(value)
        } else {
            Err(ConfigError::InvalidValue {
                key,
                message: format!("temperature {value} is outside 0.0..=2.0"),
            })
        }
    };

    let default = check(
        "relay.default_temperature".into(),
        relay.default_temperature.unwrap_or(DEFAULT_TEMPERATURE),
    )?;

    let mut by_model: HashMap<String, f32> = DEFAULT_TEMPERATURES
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    for (model, value) in relay.temperatures {
        // Normalize the key so lookups match parsed references
        let key = ProviderModelRef::parse(&model)?.to_string();
        let value = check(format!("relay.temperatures.{model}"), value)?;
        by_model.insert(key, value);
    }

    let unsupported: HashSet<String> = match relay.no_temperature {
        Some(models) => models.into_iter().map(|m| m.trim().to_string()).collect(),
        None => DEFAULT_NO_TEMPERATURE.iter().map(|s| s.to_string()).collect(),
    };

    Ok(TemperaturePolicy {
        default,
        by_model,
        unsupported,
    })
}

/// Every built-in provider is registered; a missing key only fails when a
/// request is routed to that provider.
fn provider_settings(
    mut file: HashMap<String, ProviderFileSettings>,
    env: &dyn Fn(&str) -> Option<String>,
) -> HashMap<ProviderKind, ProviderSettings> {
    for key in file.keys() {
        if ProviderKind::from_key(key).is_none() {
            tracing::warn!("Ignoring config for unknown provider '{key}'");
        }
    }

    ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let section = file.remove(kind.key()).unwrap_or_default();

            let api_key = kind
                .api_key_env()
                .iter()
                .find_map(|var| env(var).filter(|v| !v.trim().is_empty()))
                .or(section.api_key);

            let (referer, title) = if kind == ProviderKind::OpenRouter {
                (
                    env("OPENROUTER_HTTP_REFERER").or(section.referer),
                    env("OPENROUTER_X_TITLE").or(section.title),
                )
            } else {
                (section.referer, section.title)
            };
            let mut headers = Vec::new();
            if let Some(referer) = referer {
                headers.push(("HTTP-Referer".to_string(), referer));
            }
            if let Some(title) = title {
                headers.push(("X-Title".to_string(), title));
            }

            let settings = ProviderSettings {
                api_key: if kind.requires_api_key() { api_key } else { None },
                base_url: section.base_url,
                headers,
            };
            (kind, settings)
        })
        .collect()
}

/// Get the Parley config directory path (~/.parley/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
