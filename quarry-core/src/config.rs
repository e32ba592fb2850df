//! Configuration system for Quarry.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace config
//! -> explicit file -> environment. Configuration is loaded from
//! `~/.config/quarry/config.toml` and/or `.quarry/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agents::AgentProfile;
use crate::error::ConfigError;

/// Token budget used when neither the tier nor the caller sets one.
pub const DEFAULT_TOKEN_BUDGET: u64 = 120_000;

/// Top-level configuration for Quarry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarryConfig {
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    /// Persona profiles declared inline as `[[agents]]` tables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentProfile>,
}

impl QuarryConfig {
    /// Non-fatal configuration warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for w in self.research.validate() {
            warnings.push(format!("[research] {}", w));
        }
        for w in self.llm.validate() {
            warnings.push(format!("[llm] {}", w));
        }
        if self.search.providers.is_empty() {
            warnings.push("[search] no providers configured; every search will return nothing".into());
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tiers and limits
// ---------------------------------------------------------------------------

/// Named bundle of default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Simple,
    #[default]
    Standard,
    Deep,
}

impl Tier {
    /// Default limits for this tier.
    pub fn defaults(&self) -> TierLimits {
        let (max_iterations, max_queries, max_sources, max_wall_clock_secs) = match self {
            Tier::Simple => (1, 4, 5, 120),
            Tier::Standard => (2, 10, 15, 300),
            Tier::Deep => (4, 15, 25, 900),
        };
        TierLimits {
            max_iterations,
            max_queries,
            max_sources,
            max_wall_clock_secs,
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Tier::Simple),
            "standard" => Ok(Tier::Standard),
            "deep" => Ok(Tier::Deep),
            other => Err(ConfigError::Invalid {
                message: format!("unknown tier '{}' (expected simple, standard, or deep)", other),
            }),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Tier::Simple => "simple",
            Tier::Standard => "standard",
            Tier::Deep => "deep",
        })
    }
}

/// Resolved limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_iterations: u32,
    /// Queries executed per SEARCHING round.
    pub max_queries: usize,
    /// Results requested from the search provider per query.
    pub max_sources: usize,
    pub max_wall_clock_secs: u64,
    pub token_budget: u64,
}

impl TierLimits {
    /// Reject limits that make a run impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.max_iterations < 1 {
            problems.push("max_iterations must be >= 1");
        }
        if self.max_wall_clock_secs < 1 {
            problems.push("max_wall_clock_secs must be >= 1");
        }
        if self.max_queries < 1 {
            problems.push("max_queries must be >= 1");
        }
        if self.max_sources < 1 {
            problems.push("max_sources must be >= 1");
        }
        if self.token_budget < 1 {
            problems.push("token_budget must be >= 1");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                message: problems.join("; "),
            })
        }
    }

    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.max_wall_clock_secs)
    }
}

/// Explicit per-limit overrides; unset fields fall back to the tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sources: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wall_clock_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_budget: Option<u64>,
}

impl LimitOverrides {
    /// Fields set in `other` win over fields set here.
    pub fn merged_with(&self, other: &LimitOverrides) -> LimitOverrides {
        LimitOverrides {
            max_iterations: other.max_iterations.or(self.max_iterations),
            max_queries: other.max_queries.or(self.max_queries),
            max_sources: other.max_sources.or(self.max_sources),
            max_wall_clock_secs: other.max_wall_clock_secs.or(self.max_wall_clock_secs),
            token_budget: other.token_budget.or(self.token_budget),
        }
    }
}

/// Per-run options: a tier, any explicit limit overrides and an optional
/// persona prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchOptions {
    #[serde(default)]
    pub tier: Tier,
    #[serde(flatten)]
    pub overrides: LimitOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl ResearchOptions {
    pub fn for_tier(tier: Tier) -> Self {
        Self {
            tier,
            overrides: LimitOverrides::default(),
            persona: None,
        }
    }

    pub fn with_overrides(mut self, overrides: LimitOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    /// Resolve tier defaults and overrides into concrete limits.
    pub fn limits(&self) -> TierLimits {
        let defaults = self.tier.defaults();
        TierLimits {
            max_iterations: self.overrides.max_iterations.unwrap_or(defaults.max_iterations),
            max_queries: self.overrides.max_queries.unwrap_or(defaults.max_queries),
            max_sources: self.overrides.max_sources.unwrap_or(defaults.max_sources),
            max_wall_clock_secs: self
                .overrides
                .max_wall_clock_secs
                .unwrap_or(defaults.max_wall_clock_secs),
            token_budget: self.overrides.token_budget.unwrap_or(defaults.token_budget),
        }
    }
}

// ---------------------------------------------------------------------------
// Research engine settings
// ---------------------------------------------------------------------------

/// Settings for the research loop that are not per-run limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Tier used when a run does not name one.
    pub tier: Tier,
    /// Limit overrides applied to every run.
    pub limits: LimitOverrides,
    /// Newest sources kept verbatim when evidence is compacted.
    pub keep_recent: usize,
    /// Serialized-evidence size that forces compaction, in estimated tokens.
    pub source_ceiling_tokens: usize,
    /// Remaining-budget fraction below which compaction is forced.
    pub budget_floor_ratio: f64,
    /// Queries returning fewer results are reported for reformulation.
    pub min_results: usize,
    /// Hosts (and their subdomains) whose results are dropped.
    pub low_quality_domains: Vec<String>,
    /// Ask the claim verifier whether each citation supports its sentence.
    pub semantic_check: bool,
    /// Flag claims whose citation fails the semantic check.
    pub strict_citations: bool,
    /// Upper bound on any single collaborator call.
    pub call_timeout_secs: u64,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Standard,
            limits: LimitOverrides::default(),
            keep_recent: 15,
            source_ceiling_tokens: 50_000,
            budget_floor_ratio: 0.25,
            min_results: 3,
            low_quality_domains: vec![
                "piechartmaker.com".to_string(),
                "sqmagazine.co.uk".to_string(),
                "aag-it.com".to_string(),
            ],
            semantic_check: false,
            strict_citations: false,
            call_timeout_secs: 120,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl ResearchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.keep_recent == 0 {
            warnings.push("keep_recent is 0; compaction will drop every source body".to_string());
        }
        if !(0.0..=1.0).contains(&self.budget_floor_ratio) {
            warnings.push(format!(
                "budget_floor_ratio {} is outside 0.0-1.0",
                self.budget_floor_ratio
            ));
        }
        if self.strict_citations && !self.semantic_check {
            warnings.push("strict_citations has no effect without semantic_check".to_string());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; treated as a single attempt".to_string());
        }
        warnings
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Retry policy for transient collaborator failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Ceiling on a single backoff delay.
    pub max_delay_secs: f64,
    /// Add uniform random jitter in [0, 1) seconds.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_delay_secs: 10.0,
            jitter: true,
        }
    }
}

/// Circuit breaker thresholds for search failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub consecutive_failures: usize,
    pub failure_ratio: f64,
    /// Queries attempted before the ratio check applies.
    pub min_samples: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 3,
            failure_ratio: 0.5,
            min_samples: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Language-model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "ollama" or "openai".
    pub provider: String,
    /// Model identifier (e.g., "llama3.1:latest", "gpt-4o-mini").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP timeout for a single completion.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.1:latest".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 800,
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "temperature {} is outside the usual 0.0-2.0 range",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("max_tokens is 0; responses will be empty".to_string());
        }
        if let Some(base) = &self.base_url {
            if url::Url::parse(base).is_err() {
                warnings.push(format!("base_url '{}' is not a valid URL", base));
            }
        }
        warnings
    }
}

/// Search configuration: an ordered provider fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub providers: Vec<SearchProviderConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                SearchProviderConfig::new("serpapi", Some("SERPAPI_KEY")),
                SearchProviderConfig::new("duckduckgo", None),
            ],
        }
    }
}

/// One search backend in the fallback list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    /// Provider name: "serpapi" or "duckduckgo".
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

fn default_search_timeout() -> u64 {
    20
}

impl SearchProviderConfig {
    pub fn new(provider: impl Into<String>, api_key_env: Option<&str>) -> Self {
        Self {
            provider: provider.into(),
            api_key_env: api_key_env.map(str::to_string),
            base_url: None,
            timeout_secs: default_search_timeout(),
        }
    }
}

/// Run trace persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub enabled: bool,
    /// Directory for `<run_id>.json` traces; defaults to the platform data dir.
    pub dir: Option<PathBuf>,
}

impl TraceConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "quarry", "quarry")
                .map(|d| d.data_dir().join("traces"))
                .unwrap_or_else(|| PathBuf::from(".quarry/traces"))
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration with layered merging.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<QuarryConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(QuarryConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "quarry", "quarry") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".quarry").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Explicit file
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (QUARRY_LLM__MODEL, QUARRY_RESEARCH__TIER, etc.)
    figment = figment.merge(Env::prefixed("QUARRY_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tier_defaults() {
        let standard = Tier::Standard.defaults();
        assert_eq!(standard.max_iterations, 2);
        assert_eq!(standard.max_queries, 10);
        assert_eq!(standard.max_sources, 15);
        assert_eq!(standard.token_budget, DEFAULT_TOKEN_BUDGET);

        assert!(Tier::Simple.defaults().max_iterations < Tier::Deep.defaults().max_iterations);
    }

    #[test]
    fn test_tier_from_str() {
        assert_eq!("Deep".parse::<Tier>().unwrap(), Tier::Deep);
        assert!("extreme".parse::<Tier>().is_err());
    }

    #[test]
    fn test_options_override_tier_defaults() {
        let options = ResearchOptions::for_tier(Tier::Simple).with_overrides(LimitOverrides {
            max_iterations: Some(3),
            token_budget: Some(10_000),
            ..Default::default()
        });
        let limits = options.limits();
        assert_eq!(limits.max_iterations, 3);
        assert_eq!(limits.token_budget, 10_000);
        assert_eq!(limits.max_queries, Tier::Simple.defaults().max_queries);
    }

    #[test]
    fn test_limits_validate_rejects_zero() {
        let mut limits = Tier::Standard.defaults();
        assert!(limits.validate().is_ok());

        limits.max_iterations = 0;
        limits.max_sources = 0;
        let err = limits.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("max_iterations"));
        assert!(message.contains("max_sources"));
    }

    #[test]
    fn test_overrides_merge_prefers_other() {
        let base = LimitOverrides {
            max_iterations: Some(2),
            max_queries: Some(5),
            ..Default::default()
        };
        let request = LimitOverrides {
            max_iterations: Some(1),
            ..Default::default()
        };
        let merged = base.merged_with(&request);
        assert_eq!(merged.max_iterations, Some(1));
        assert_eq!(merged.max_queries, Some(5));
    }

    #[test]
    fn test_options_deserialize_flattened() {
        let options: ResearchOptions =
            serde_json::from_str(r#"{"tier":"deep","max_iterations":1}"#).unwrap();
        assert_eq!(options.tier, Tier::Deep);
        assert_eq!(options.limits().max_iterations, 1);
        assert_eq!(options.limits().max_queries, 15);
    }

    #[test]
    fn test_default_config_validates_clean() {
        let config = QuarryConfig::default();
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_strict_without_semantic_warns() {
        let config = ResearchConfig {
            strict_citations: true,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.research.retry.max_attempts, 3);
        assert_eq!(config.research.breaker.consecutive_failures, 3);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let quarry_dir = dir.path().join(".quarry");
        std::fs::create_dir_all(&quarry_dir).unwrap();
        std::fs::write(
            quarry_dir.join("config.toml"),
            r#"
[research]
tier = "deep"
keep_recent = 8
semantic_check = true

[research.limits]
max_iterations = 3

[llm]
provider = "openai"
model = "gpt-4o-mini"

[[search.providers]]
provider = "duckduckgo"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.tier, Tier::Deep);
        assert_eq!(config.research.keep_recent, 8);
        assert!(config.research.semantic_check);
        assert_eq!(config.research.limits.max_iterations, Some(3));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.search.providers.len(), 1);
        assert_eq!(config.search.providers[0].timeout_secs, 20);
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(None, Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
