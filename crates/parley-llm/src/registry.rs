//! Supported providers and credential resolution
//!
//! The provider table is static. A [`ProviderRegistry`] is built once from
//! configuration and resolves each provider's credential with the order
//! explicit config key, then environment variable, then (for the local
//! provider only) implicitly configured.

use std::sync::Arc;

use indexmap::IndexMap;
use parley_config::{ProviderConfig, ProvidersConfig};
use secrecy::SecretString;
use serde::Serialize;
use url::Url;

use crate::error::LlmError;

/// Wire protocol family spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    /// `OpenAI` chat completions and compatible hosts
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
}

/// How a provider's model list is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStrategy {
    /// Built-in table only
    Static,
    /// The provider's own listing endpoint
    Dynamic,
    /// Built-in id list enriched from the metadata catalog
    Hybrid,
}

/// Shape a provider uses to control model reasoning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStyle {
    /// No reasoning control
    None,
    /// `reasoning_effort: "low" | "medium" | "high"`
    EffortEnum,
    /// `reasoning: { effort }`
    EffortObject,
    /// `think: true`
    EnableFlag,
    /// `thinking: { type: "enabled", budget_tokens }`
    BudgetTokens,
    /// `generationConfig.thinkingConfig.thinkingBudget`
    ThinkingBudget,
}

/// Static description of a supported provider
#[derive(Debug)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub family: ProviderFamily,
    /// Environment variable consulted when config has no key
    pub api_key_env: Option<&'static str>,
    /// Environment variable that overrides the base URL
    pub base_url_env: Option<&'static str>,
    pub default_base_url: Option<&'static str>,
    pub default_model: &'static str,
    pub listing: ListingStrategy,
    pub reasoning: ReasoningStyle,
    /// Offers a server-side web search tool
    pub native_search: bool,
    /// Honors cache-control hints on system content
    pub prompt_caching: bool,
    /// Accepts `stream_options.include_usage`
    pub stream_usage: bool,
    /// Provider key in the metadata catalog
    pub metadata_key: Option<&'static str>,
}

impl ProviderSpec {
    /// Whether the provider works without any credential
    pub const fn is_local(&self) -> bool {
        self.api_key_env.is_none() && self.default_base_url.is_some()
    }

    /// Actionable hint telling the user how to supply a credential
    pub fn credential_hint(&self) -> String {
        match self.api_key_env {
            Some(var) => format!("Set {var} or add `api_key` under [providers.{}] in parley.toml", self.name),
            None => format!("Check `base_url` under [providers.{}] in parley.toml", self.name),
        }
    }
}

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("OPENAI_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.openai.com/v1"),
        default_model: "gpt-4.1",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::EffortEnum,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("openai"),
    },
    ProviderSpec {
        name: "anthropic",
        display_name: "Anthropic",
        family: ProviderFamily::Anthropic,
        api_key_env: Some("ANTHROPIC_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.anthropic.com/v1"),
        default_model: "claude-sonnet-4-20250514",
        listing: ListingStrategy::Static,
        reasoning: ReasoningStyle::BudgetTokens,
        native_search: true,
        prompt_caching: true,
        stream_usage: false,
        metadata_key: Some("anthropic"),
    },
    ProviderSpec {
        name: "google",
        display_name: "Google Gemini",
        family: ProviderFamily::Google,
        api_key_env: Some("GOOGLE_GENERATIVE_AI_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://generativelanguage.googleapis.com/v1beta"),
        default_model: "gemini-2.5-flash",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::ThinkingBudget,
        native_search: true,
        prompt_caching: false,
        stream_usage: false,
        metadata_key: Some("google"),
    },
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("OPENROUTER_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://openrouter.ai/api/v1"),
        default_model: "openrouter/auto",
        listing: ListingStrategy::Dynamic,
        reasoning: ReasoningStyle::EffortObject,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("openrouter"),
    },
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("GROQ_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.groq.com/openai/v1"),
        default_model: "llama-3.3-70b-versatile",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::EffortEnum,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("groq"),
    },
    ProviderSpec {
        name: "xai",
        display_name: "xAI",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("XAI_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.x.ai/v1"),
        default_model: "grok-4",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::EffortEnum,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("xai"),
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("DEEPSEEK_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.deepseek.com/v1"),
        default_model: "deepseek-chat",
        listing: ListingStrategy::Static,
        reasoning: ReasoningStyle::None,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("deepseek"),
    },
    ProviderSpec {
        name: "mistral",
        display_name: "Mistral",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("MISTRAL_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.mistral.ai/v1"),
        default_model: "mistral-large-latest",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::None,
        native_search: false,
        prompt_caching: false,
        stream_usage: false,
        metadata_key: Some("mistral"),
    },
    ProviderSpec {
        name: "together",
        display_name: "Together AI",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("TOGETHER_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.together.xyz/v1"),
        default_model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
        listing: ListingStrategy::Dynamic,
        reasoning: ReasoningStyle::None,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("togetherai"),
    },
    ProviderSpec {
        name: "fireworks",
        display_name: "Fireworks AI",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("FIREWORKS_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.fireworks.ai/inference/v1"),
        default_model: "accounts/fireworks/models/llama-v3p3-70b-instruct",
        listing: ListingStrategy::Dynamic,
        reasoning: ReasoningStyle::None,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("fireworks-ai"),
    },
    ProviderSpec {
        name: "cerebras",
        display_name: "Cerebras",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("CEREBRAS_API_KEY"),
        base_url_env: None,
        default_base_url: Some("https://api.cerebras.ai/v1"),
        default_model: "llama-3.3-70b",
        listing: ListingStrategy::Hybrid,
        reasoning: ReasoningStyle::None,
        native_search: false,
        prompt_caching: false,
        stream_usage: true,
        metadata_key: Some("cerebras"),
    },
    ProviderSpec {
        name: "ollama",
        display_name: "Ollama",
        family: ProviderFamily::OpenAi,
        api_key_env: None,
        base_url_env: Some("OLLAMA_BASE_URL"),
        default_base_url: Some("http://localhost:11434/v1"),
        default_model: "llama3.1",
        listing: ListingStrategy::Dynamic,
        reasoning: ReasoningStyle::EnableFlag,
        native_search: false,
        prompt_caching: false,
        stream_usage: false,
        metadata_key: None,
    },
    ProviderSpec {
        name: "openai-compatible",
        display_name: "OpenAI Compatible",
        family: ProviderFamily::OpenAi,
        api_key_env: Some("OPENAI_COMPATIBLE_API_KEY"),
        base_url_env: Some("OPENAI_COMPATIBLE_BASE_URL"),
        default_base_url: None,
        default_model: "",
        listing: ListingStrategy::Dynamic,
        reasoning: ReasoningStyle::EffortEnum,
        native_search: false,
        prompt_caching: false,
        stream_usage: false,
        metadata_key: None,
    },
];

/// Look up a provider in the static table
pub fn spec(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|p| p.name == name)
}

/// Where a provider's credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `api_key` in the config file
    Config,
    /// The provider's environment variable
    Environment,
    /// Local provider that needs no credential
    Implicit,
    /// No credential found
    Missing,
}

/// Public summary of a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub display_name: String,
    pub configured: bool,
}

/// A provider with its credential, endpoint, and default model resolved
#[derive(Debug)]
pub struct ResolvedProvider {
    pub spec: &'static ProviderSpec,
    api_key: Option<SecretString>,
    credential: CredentialSource,
    /// `None` only for providers without a default endpoint
    pub base_url: Option<Url>,
    pub default_model: String,
}

impl ResolvedProvider {
    pub const fn name(&self) -> &'static str {
        self.spec.name
    }

    pub const fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }

    pub const fn credential_source(&self) -> CredentialSource {
        self.credential
    }

    /// Whether a usable credential was found
    pub fn configured(&self) -> bool {
        self.credential != CredentialSource::Missing
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.spec.name.to_owned(),
            display_name: self.spec.display_name.to_owned(),
            configured: self.configured(),
        }
    }

    fn resolve(spec: &'static ProviderSpec, config: Option<&ProviderConfig>, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let from_config = config.and_then(|c| c.api_key.clone());
        let from_env = || {
            spec.api_key_env
                .and_then(env)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let (api_key, credential) = if let Some(key) = from_config {
            (Some(key), CredentialSource::Config)
        } else if let Some(key) = from_env() {
            (Some(key), CredentialSource::Environment)
        } else if spec.is_local() {
            (None, CredentialSource::Implicit)
        } else {
            (None, CredentialSource::Missing)
        };

        let base_url = config
            .and_then(|c| c.base_url.clone())
            .or_else(|| spec.base_url_env.and_then(env).and_then(|raw| parse_url(spec.name, &raw)))
            .or_else(|| spec.default_base_url.and_then(|raw| parse_url(spec.name, raw)));

        let default_model = config
            .and_then(|c| c.default_model.clone())
            .unwrap_or_else(|| spec.default_model.to_owned());

        Self {
            spec,
            api_key,
            credential,
            base_url,
            default_model,
        }
    }
}

fn parse_url(provider: &str, raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(provider = %provider, url = %raw, error = %e, "ignoring invalid base URL");
            None
        }
    }
}

/// Enabled providers, in table order
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: IndexMap<&'static str, Arc<ResolvedProvider>>,
}

impl ProviderRegistry {
    /// Build from configuration using process environment variables
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, LlmError> {
        Self::with_env(config, |var| std::env::var(var).ok())
    }

    /// Build from configuration with a custom environment lookup
    pub fn with_env<F>(config: &ProvidersConfig, env: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(unknown) = config.keys().find(|name| spec(name).is_none()) {
            return Err(LlmError::configuration(
                unknown.as_str(),
                format!("unknown provider '{unknown}' in configuration"),
            ));
        }

        let providers: IndexMap<_, _> = PROVIDERS
            .iter()
            .filter_map(|spec| {
                let provider_config = config.get(spec.name);
                if provider_config.is_some_and(|c| !c.enabled) {
                    tracing::debug!(provider = %spec.name, "provider disabled by configuration");
                    return None;
                }
                Some((spec.name, Arc::new(ResolvedProvider::resolve(spec, provider_config, &env))))
            })
            .collect();

        if providers.is_empty() {
            return Err(LlmError::configuration("", "no usable provider: every provider is disabled"));
        }

        tracing::debug!(
            enabled = providers.len(),
            configured = providers.values().filter(|p| p.configured()).count(),
            "provider registry built"
        );

        Ok(Self { providers })
    }

    /// All enabled providers with their configured flag
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.values().map(|p| p.descriptor()).collect()
    }

    /// Resolve a provider by name
    pub fn resolve(&self, name: &str) -> Result<Arc<ResolvedProvider>, LlmError> {
        if let Some(provider) = self.providers.get(name) {
            return Ok(Arc::clone(provider));
        }

        let message = if spec(name).is_some() {
            format!("provider '{name}' is disabled in configuration")
        } else {
            format!("unknown provider '{name}'")
        };
        Err(LlmError::configuration(name, message))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn provider_config(api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.map(SecretString::from),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn only_the_local_provider_is_configured_without_credentials() {
        let registry = ProviderRegistry::with_env(&ProvidersConfig::new(), no_env).unwrap();
        let configured: Vec<_> = registry
            .list_providers()
            .into_iter()
            .filter(|p| p.configured)
            .map(|p| p.name)
            .collect();
        assert_eq!(configured, vec!["ollama".to_owned()]);
    }

    #[test]
    fn environment_variable_is_a_fallback() {
        let registry = ProviderRegistry::with_env(&ProvidersConfig::new(), |var| {
            (var == "ANTHROPIC_API_KEY").then(|| "sk-env".to_owned())
        })
        .unwrap();

        let anthropic = registry.resolve("anthropic").unwrap();
        assert!(anthropic.configured());
        assert_eq!(anthropic.credential_source(), CredentialSource::Environment);
        assert_eq!(anthropic.api_key().unwrap().expose_secret(), "sk-env");
    }

    #[test]
    fn config_key_beats_environment() {
        let mut config = ProvidersConfig::new();
        config.insert("openai".to_owned(), provider_config(Some("sk-config")));

        let registry = ProviderRegistry::with_env(&config, |_| Some("sk-env".to_owned())).unwrap();
        let openai = registry.resolve("openai").unwrap();
        assert_eq!(openai.credential_source(), CredentialSource::Config);
        assert_eq!(openai.api_key().unwrap().expose_secret(), "sk-config");
    }

    #[test]
    fn blank_environment_value_does_not_configure() {
        let registry = ProviderRegistry::with_env(&ProvidersConfig::new(), |_| Some("   ".to_owned())).unwrap();
        assert!(!registry.resolve("openai").unwrap().configured());
    }

    #[test]
    fn unknown_provider_in_config_is_a_configuration_error() {
        let mut config = ProvidersConfig::new();
        config.insert("skynet".to_owned(), provider_config(None));

        let err = ProviderRegistry::with_env(&config, no_env).unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
        assert!(err.message().contains("skynet"));
    }

    #[test]
    fn resolving_unknown_or_disabled_provider_fails() {
        let mut config = ProvidersConfig::new();
        config.insert(
            "groq".to_owned(),
            ProviderConfig {
                enabled: false,
                ..ProviderConfig::default()
            },
        );
        let registry = ProviderRegistry::with_env(&config, no_env).unwrap();

        let err = registry.resolve("groq").unwrap_err();
        assert!(err.message().contains("disabled"));
        assert!(registry.list_providers().iter().all(|p| p.name != "groq"));

        let err = registry.resolve("nope").unwrap_err();
        assert_eq!(err, LlmError::configuration("nope", "unknown provider 'nope'"));
    }

    #[test]
    fn disabling_everything_leaves_no_usable_provider() {
        let config: ProvidersConfig = PROVIDERS
            .iter()
            .map(|spec| {
                (
                    spec.name.to_owned(),
                    ProviderConfig {
                        enabled: false,
                        ..ProviderConfig::default()
                    },
                )
            })
            .collect();

        let err = ProviderRegistry::with_env(&config, no_env).unwrap_err();
        assert!(matches!(err, LlmError::Configuration { .. }));
    }

    #[test]
    fn base_url_resolution_order() {
        let registry = ProviderRegistry::with_env(&ProvidersConfig::new(), |var| {
            (var == "OLLAMA_BASE_URL").then(|| "http://gpu-box:11434/v1".to_owned())
        })
        .unwrap();
        assert_eq!(
            registry.resolve("ollama").unwrap().base_url.as_ref().map(Url::as_str),
            Some("http://gpu-box:11434/v1")
        );
        assert!(registry.resolve("openai-compatible").unwrap().base_url.is_none());
        assert_eq!(
            registry.resolve("anthropic").unwrap().base_url.as_ref().map(Url::as_str),
            Some("https://api.anthropic.com/v1")
        );
    }

    #[test]
    fn default_model_can_be_overridden() {
        let mut config = ProvidersConfig::new();
        config.insert(
            "google".to_owned(),
            ProviderConfig {
                default_model: Some("gemini-2.5-pro".to_owned()),
                ..ProviderConfig::default()
            },
        );
        let registry = ProviderRegistry::with_env(&config, no_env).unwrap();
        assert_eq!(registry.resolve("google").unwrap().default_model, "gemini-2.5-pro");
        assert_eq!(registry.resolve("openai").unwrap().default_model, "gpt-4.1");
    }

    #[test]
    fn provider_names_are_unique() {
        for (i, spec) in PROVIDERS.iter().enumerate() {
            assert!(PROVIDERS[i + 1..].iter().all(|other| other.name != spec.name), "{}", spec.name);
        }
        assert_eq!(PROVIDERS.iter().filter(|p| p.is_local()).count(), 1);
    }
}
