use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub workflows: WorkflowsConfig,
}

impl Config {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `quarry.toml` from the working directory when present,
    /// otherwise fall back to defaults.
    pub fn load_default() -> Result<Self> {
        let path = Path::new("quarry.toml");
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.safety.validate()?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_bind")]
    pub bind: String,
    /// Allowed CORS origin. `None` = same-origin only.
    #[serde(default)]
    pub cors_origin: Option<String>,
    /// Pre-shared token required on the multiplexed WebSocket endpoint.
    /// `None` = open access (dev mode).
    #[serde(default)]
    pub ws_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: d_bind(),
            cors_origin: None,
            ws_token: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hard ceiling on configurable turns; anything above is a config error.
pub const MAX_TURNS_LIMIT: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard upper bound on decide/execute turns.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    /// Seed a sanctions-screening lead after the first successful search.
    #[serde(default = "d_true")]
    pub auto_sanctions_screen: bool,
    /// Seed a news-check lead after the first successful search.
    #[serde(default = "d_true")]
    pub auto_news_check: bool,
    /// When false, the loop runs under a no-op harness.
    #[serde(default = "d_true")]
    pub enable_safety: bool,
    /// Run the graph post-processor after the loop.
    #[serde(default = "d_true")]
    pub generate_graph: bool,
    /// Provider id handed to the decision policy.
    #[serde(default = "d_provider")]
    pub llm_provider: String,
    /// Force the heuristic policy and the fixture data source.
    #[serde(default)]
    pub demo_mode: bool,
    /// Auto-save the session here after the loop terminates.
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
    /// Per-tool-call deadline in seconds.
    #[serde(default = "d_tool_timeout")]
    pub tool_timeout_secs: u64,
    /// Optional wall-clock bound on the whole investigation.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// Findings needed before the heuristic policy may conclude.
    #[serde(default = "d_min_findings")]
    pub min_findings_to_conclude: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: d_max_turns(),
            auto_sanctions_screen: true,
            auto_news_check: true,
            enable_safety: true,
            generate_graph: true,
            llm_provider: d_provider(),
            demo_mode: false,
            persist_path: None,
            tool_timeout_secs: d_tool_timeout(),
            deadline_secs: None,
            min_findings_to_conclude: d_min_findings(),
        }
    }
}

impl AgentConfig {
    /// Reject bad configurations before the loop starts.
    ///
    /// `max_turns == 0` is allowed: the seed phase still runs and the
    /// result is a valid partial session.
    pub fn validate(&self) -> Result<()> {
        if self.max_turns > MAX_TURNS_LIMIT {
            return Err(Error::Config(format!(
                "max_turns {} exceeds limit {MAX_TURNS_LIMIT}",
                self.max_turns
            )));
        }
        if self.tool_timeout_secs == 0 {
            return Err(Error::Config("tool_timeout_secs must be positive".into()));
        }
        if self.deadline_secs == Some(0) {
            return Err(Error::Config("deadline_secs must be positive".into()));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Safety harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whether pre-check blocks are advisory or binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    /// Record would-be blocks in the audit log and proceed.
    #[default]
    Observe,
    /// Skip blocked actions.
    Enforce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub mode: SafetyMode,
    #[serde(default = "d_true")]
    pub enable_shield: bool,
    #[serde(default = "d_true")]
    pub enable_monitor: bool,
    #[serde(default = "d_true")]
    pub enable_redactor: bool,
    /// Total spend ceiling across one investigation. `None` = unlimited.
    #[serde(default)]
    pub budget_limit: Option<f64>,
    /// Per-tool call ceiling within a sliding one-minute window.
    #[serde(default = "d_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Consecutive failures before a tool's circuit breaker opens.
    #[serde(default = "d_breaker_threshold")]
    pub breaker_threshold: u32,
    /// Seconds an open breaker stays open before allowing a retrial.
    #[serde(default = "d_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
    /// Capsule restriction: when non-empty, only these tools may run.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            mode: SafetyMode::Observe,
            enable_shield: true,
            enable_monitor: true,
            enable_redactor: true,
            budget_limit: None,
            rate_limit_per_minute: d_rate_limit(),
            breaker_threshold: d_breaker_threshold(),
            breaker_cooldown_secs: d_breaker_cooldown(),
            allowed_tools: Vec::new(),
        }
    }
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_per_minute == 0 {
            return Err(Error::Config("rate_limit_per_minute must be positive".into()));
        }
        if self.breaker_threshold == 0 {
            return Err(Error::Config("breaker_threshold must be positive".into()));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Cap on the serialized result text handed to the post-check.
    #[serde(default = "d_max_result_chars")]
    pub max_result_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_result_chars: d_max_result_chars(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic canned responses (demo and tests).
    Stub,
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default)]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default = "d_provider_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_provider")]
    pub default_provider: String,
    /// Provider id → connection settings. A `stub` provider is always
    /// registered even when absent here.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: d_provider(),
            providers: HashMap::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowsConfig {
    /// Directory of YAML workflow definitions loaded next to the
    /// built-in catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ── Serde default helpers ─────────────────────────────────────────

fn d_bind() -> String {
    "127.0.0.1:8700".to_string()
}
fn d_true() -> bool {
    true
}
fn d_max_turns() -> u32 {
    15
}
fn d_provider() -> String {
    "stub".to_string()
}
fn d_tool_timeout() -> u64 {
    30
}
fn d_min_findings() -> usize {
    3
}
fn d_rate_limit() -> u32 {
    60
}
fn d_breaker_threshold() -> u32 {
    3
}
fn d_breaker_cooldown() -> u64 {
    60
}
fn d_max_result_chars() -> usize {
    16_000
}
fn d_provider_timeout() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_turns, 15);
        assert_eq!(config.agent.llm_provider, "stub");
        assert_eq!(config.safety.mode, SafetyMode::Observe);
    }

    #[test]
    fn zero_max_turns_is_allowed() {
        let config = AgentConfig {
            max_turns: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn excessive_max_turns_rejected() {
        let config = AgentConfig {
            max_turns: MAX_TURNS_LIMIT + 1,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [agent]
            max_turns = 5
            demo_mode = true

            [safety]
            mode = "enforce"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent.max_turns, 5);
        assert!(config.agent.demo_mode);
        assert!(config.agent.auto_sanctions_screen);
        assert_eq!(config.safety.mode, SafetyMode::Enforce);
        assert_eq!(config.server.bind, "127.0.0.1:8700");
    }
}
