//! Resolve `provider:model` references to adapters and sampling settings.
//!
//! The registry is built once at start-up and only read afterwards. Routing
//! never touches the network: adapters are constructed on demand around the
//! shared HTTP client.

use crate::{
    AnthropicProvider, DemoProvider, GeminiProvider, OpenAiCompatibleProvider, TokenLimitParam,
};
use parley_types::provider::{Provider, ProviderRequest};
use parley_types::{ChatTurn, ConfigError, ProviderModelRef};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// The built-in provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Groq,
    Nebius,
    Anthropic,
    Gemini,
    Demo,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        Self::OpenAi,
        Self::OpenRouter,
        Self::Groq,
        Self::Nebius,
        Self::Anthropic,
        Self::Gemini,
        Self::Demo,
    ];

    /// The key used in `provider:model` references and config sections.
    pub fn key(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Groq => "groq",
            Self::Nebius => "nebius",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Demo => "demo",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Nebius => Some("https://api.tokenfactory.nebius.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::Demo => None,
        }
    }

    /// Environment variables consulted for the API key, in order.
    pub fn api_key_env(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::OpenRouter => &["OPENROUTER_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
            Self::Nebius => &["NEBIUS_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Demo => &[],
        }
    }

    pub fn requires_api_key(self) -> bool {
        self != Self::Demo
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Credentials and endpoint overrides for one built-in provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

/// How the sampling temperature is chosen for a request.
#[derive(Debug, Clone)]
pub struct TemperaturePolicy {
    /// Fallback when neither the caller nor the table has a value.
    pub default: f32,
    /// Per `provider:model` values.
    pub by_model: HashMap<String, f32>,
    /// Bare model names that reject the parameter.
    pub unsupported: HashSet<String>,
}

impl Default for TemperaturePolicy {
    fn default() -> Self {
        Self {
            default: 0.7,
            by_model: HashMap::new(),
            unsupported: ["gpt-5", "gpt-5-mini", "gpt-5-nano"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TemperaturePolicy {
    /// Values accepted from configuration and from callers.
    pub const RANGE: RangeInclusive<f32> = 0.0..=2.0;

    /// Caller override first, then the per-model table, then the default.
    pub fn resolve(&self, model_ref: &ProviderModelRef, requested: Option<f32>) -> f32 {
        requested
            .or_else(|| self.by_model.get(&model_ref.to_string()).copied())
            .unwrap_or(self.default)
    }

    pub fn is_supported(&self, model_ref: &ProviderModelRef) -> bool {
        !self.unsupported.contains(&model_ref.model)
    }
}

/// A resolved routing decision for one request.
#[derive(Clone)]
pub struct Route {
    pub model_ref: ProviderModelRef,
    pub provider: Arc<dyn Provider>,
    /// `None` when the model does not take a temperature.
    pub temperature: Option<f32>,
}

impl Route {
    pub fn request(&self, turns: Vec<ChatTurn>, max_tokens: u32) -> ProviderRequest {
        ProviderRequest {
            model: self.model_ref.model.clone(),
            turns,
            temperature: self.temperature,
            max_tokens,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("model_ref", &self.model_ref)
            .field("provider", &self.provider.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Maps provider keys to adapters.
pub struct ProviderRegistry {
    http: reqwest::Client,
    builtin: HashMap<ProviderKind, ProviderSettings>,
    custom: HashMap<String, Arc<dyn Provider>>,
    allowed: Option<Vec<ProviderModelRef>>,
    temperatures: TemperaturePolicy,
}

impl ProviderRegistry {
    /// An empty registry: no provider is routable until registered.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            builtin: HashMap::new(),
            custom: HashMap::new(),
            allowed: None,
            temperatures: TemperaturePolicy::default(),
        }
    }

    /// Enable a built-in provider family with the given settings.
    pub fn register_builtin(&mut self, kind: ProviderKind, settings: ProviderSettings) {
        self.builtin.insert(kind, settings);
    }

    /// Register a ready-made adapter under `key`. Takes precedence over a
    /// built-in family with the same key.
    pub fn register(&mut self, key: &str, provider: Arc<dyn Provider>) {
        self.custom.insert(key.trim().to_lowercase(), provider);
    }

    /// Restrict routing to these references.
    pub fn with_allowed_models(mut self, models: Vec<ProviderModelRef>) -> Self {
        self.allowed = Some(models);
        self
    }

    pub fn with_temperatures(mut self, policy: TemperaturePolicy) -> Self {
        self.temperatures = policy;
        self
    }

    /// The configured model options, in configuration order.
    pub fn models(&self) -> Vec<String> {
        self.allowed
            .iter()
            .flatten()
            .map(ToString::to_string)
            .collect()
    }

    pub fn resolve(&self, model: &str, temperature: Option<f32>) -> Result<Route, ConfigError> {
        let model_ref = ProviderModelRef::parse(model)?;

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(&model_ref) {
                return Err(ConfigError::UnsupportedModel {
                    model: model_ref.to_string(),
                });
            }
        }

        let provider = match self.custom.get(&model_ref.provider) {
            Some(provider) => Arc::clone(provider),
            None => self.build(&model_ref.provider)?,
        };

        let temperature = self
            .temperatures
            .is_supported(&model_ref)
            .then(|| self.temperatures.resolve(&model_ref, temperature));

        tracing::debug!(model = %model_ref, provider = provider.name(), ?temperature, "routed");
        Ok(Route {
            model_ref,
            provider,
            temperature,
        })
    }

    fn build(&self, key: &str) -> Result<Arc<dyn Provider>, ConfigError> {
        let unknown = || ConfigError::UnknownProvider {
            provider: key.to_string(),
        };
        let kind = ProviderKind::from_key(key).ok_or_else(unknown)?;
        let settings = self.builtin.get(&kind).ok_or_else(unknown)?;

        if kind == ProviderKind::Demo {
            return Ok(Arc::new(DemoProvider::new()));
        }

        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: kind
                    .api_key_env()
                    .first()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("providers.{key}.api_key")),
            })?;
        let base_url = settings
            .base_url
            .clone()
            .or_else(|| kind.default_base_url().map(String::from))
            .ok_or_else(|| ConfigError::MissingKey {
                key: format!("providers.{key}.base_url"),
            })?;
        let http = self.http.clone();

        let provider: Arc<dyn Provider> = match kind {
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(http, api_key, base_url)),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new(http, api_key, base_url)),
            ProviderKind::OpenAi => Arc::new(
                OpenAiCompatibleProvider::new(key, http, api_key, base_url)
                    .with_token_param(TokenLimitParam::MaxCompletionTokens)
                    .with_headers(settings.headers.clone()),
            ),
            ProviderKind::OpenRouter | ProviderKind::Groq | ProviderKind::Nebius => Arc::new(
                OpenAiCompatibleProvider::new(key, http, api_key, base_url)
                    .with_headers(settings.headers.clone()),
            ),
            ProviderKind::Demo => Arc::new(DemoProvider::new()),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(reqwest::Client::new());
        registry.register_builtin(ProviderKind::Demo, ProviderSettings::default());
        registry.register_builtin(
            ProviderKind::OpenAi,
            ProviderSettings {
                api_key: Some("sk-test".into()),
                ..Default::default()
            },
        );
        registry.register_builtin(ProviderKind::Anthropic, ProviderSettings::default());
        registry
    }

    fn model_ref(s: &str) -> ProviderModelRef {
        ProviderModelRef::parse(s).unwrap()
    }

    #[test]
    fn kind_keys_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(ProviderKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ProviderKind::from_key("ollama"), None);
    }

    #[test]
    fn resolves_demo_without_credentials() {
        let route = registry().resolve("demo:echo", None).unwrap();
        assert_eq!(route.provider.name(), "demo");
        assert_eq!(route.model_ref.model, "echo");
        assert_eq!(route.temperature, Some(0.7));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            registry().resolve("ollama:llama3", None),
            Err(ConfigError::UnknownProvider { provider }) if provider == "ollama"
        ));
        // Known family that was never enabled
        assert!(matches!(
            registry().resolve("groq:llama-3.1-8b-instant", None),
            Err(ConfigError::UnknownProvider { .. })
        ));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        match registry().resolve("anthropic:claude-haiku-4-5", None) {
            Err(ConfigError::MissingKey { key }) => assert_eq!(key, "ANTHROPIC_API_KEY"),
            other => panic!("Expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn malformed_ref_is_rejected() {
        assert!(matches!(
            registry().resolve("gpt-5", None),
            Err(ConfigError::InvalidModelRef { .. })
        ));
    }

    #[test]
    fn allow_list_is_enforced() {
        let registry = registry().with_allowed_models(vec![model_ref("demo:echo")]);
        assert!(registry.resolve(" Demo : echo ", None).is_ok());
        assert!(matches!(
            registry.resolve("openai:gpt-5", None),
            Err(ConfigError::UnsupportedModel { model }) if model == "openai:gpt-5"
        ));
        assert_eq!(registry.models(), vec!["demo:echo".to_string()]);
    }

    #[test]
    fn temperature_precedence() {
        let mut policy = TemperaturePolicy::default();
        policy.by_model.insert("demo:echo".into(), 0.3);
        let registry = registry().with_temperatures(policy);

        assert_eq!(registry.resolve("demo:echo", Some(1.1)).unwrap().temperature, Some(1.1));
        assert_eq!(registry.resolve("demo:echo", None).unwrap().temperature, Some(0.3));

        let mut policy = TemperaturePolicy::default();
        policy.default = 0.5;
        let registry = self::registry().with_temperatures(policy);
        assert_eq!(registry.resolve("demo:echo", None).unwrap().temperature, Some(0.5));
    }

    #[test]
    fn unsupported_temperature_is_not_sent() {
        let route = registry().resolve("openai:gpt-5-mini", Some(0.2)).unwrap();
        assert_eq!(route.provider.name(), "openai");
        assert_eq!(route.temperature, None);

        let request = route.request(vec![ChatTurn::user("hi")], 2048);
        assert_eq!(request.model, "gpt-5-mini");
        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, 2048);
    }

    #[test]
    fn custom_adapter_shadows_builtin() {
        let mut registry = registry();
        registry.register("OpenAI", Arc::new(DemoProvider::new()));
        let route = registry.resolve("openai:echo", None).unwrap();
        assert_eq!(route.provider.name(), "demo");
    }
}
