//! TOML configuration.
//!
//! Every section is optional; a missing file section takes its defaults, so
//! an empty file (or [`Config::default`]) gives a clamscan-only setup that
//! keeps history in `data.json` and sends no alerts.
//!
//! ```toml
//! [dispatcher]
//! deadline_secs = 180
//!
//! [quarantine]
//! user = "AVsecure"
//!
//! [engines.virustotal]
//! enabled = true
//! api_key = "..."          # or SCANWATCH_VIRUSTOTAL_API_KEY
//! poll_interval_secs = 5
//! max_retries = 15
//! ```

use crate::core::error::ConfigError;
use crate::core::{ArcEngine, ScanError};
use crate::dispatch::DispatcherConfig;
use crate::engines::{
    hybrid_analysis, metadefender, virustotal, ClamscanConfig, ClamscanEngine,
    HybridAnalysisProvider, MetaDefenderProvider, PollPolicy, RemoteConfig, VirusTotalProvider,
};
use crate::quarantine::DEFAULT_QUARANTINE_USER;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Prefix of the environment variables that override API keys.
pub const API_KEY_ENV_PREFIX: &str = "SCANWATCH_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fan-out settings.
    pub dispatcher: DispatcherSection,
    /// Quarantine location.
    pub quarantine: QuarantineSection,
    /// History persistence.
    pub history: HistorySection,
    /// Alert delivery.
    pub alerts: AlertsSection,
    /// Engine set.
    pub engines: EnginesSection,
}

/// `[dispatcher]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherSection {
    /// Overall deadline for one dispatch.
    pub deadline_secs: u64,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self { deadline_secs: 180 }
    }
}

/// `[quarantine]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuarantineSection {
    /// Dedicated identity whose home holds the quarantine.
    pub user: String,
    /// Explicit quarantine directory; takes precedence over `user`.
    pub directory: Option<PathBuf>,
}

impl Default for QuarantineSection {
    fn default() -> Self {
        Self {
            user: DEFAULT_QUARANTINE_USER.to_string(),
            directory: None,
        }
    }
}

/// `[history]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// History file. Unset keeps history in memory only.
    pub path: Option<PathBuf>,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data.json")),
        }
    }
}

/// `[alerts]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    /// Chat webhook to post threat alerts to.
    pub webhook_url: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// `[engines]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnginesSection {
    /// Local ClamAV.
    pub clamscan: ClamscanSection,
    /// VirusTotal.
    pub virustotal: RemoteSection,
    /// MetaDefender Cloud.
    pub metadefender: RemoteSection,
    /// Hybrid Analysis.
    pub hybrid_analysis: RemoteSection,
}

/// `[engines.clamscan]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClamscanSection {
    /// Whether the engine takes part in dispatches.
    pub enabled: bool,
    /// Executable.
    pub command: String,
    /// Extra arguments.
    pub args: Vec<String>,
    /// Process timeout.
    pub timeout_secs: u64,
}

impl Default for ClamscanSection {
    fn default() -> Self {
        let defaults = ClamscanConfig::default();
        Self {
            enabled: true,
            command: defaults.command,
            args: defaults.args,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl ClamscanSection {
    fn to_engine_config(&self) -> ClamscanConfig {
        ClamscanConfig::new()
            .with_command(self.command.clone())
            .with_args(self.args.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// `[engines.<remote>]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Whether the engine takes part in dispatches.
    pub enabled: bool,
    /// API key.
    #[serde(deserialize_with = "secret_opt")]
    pub api_key: Option<SecretString>,
    /// API root; each engine has its own default.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Maximum number of status polls.
    pub max_retries: u32,
    /// Wait before each poll; each engine has its own default.
    pub poll_interval_secs: Option<u64>,
    /// Sandbox environment (Hybrid Analysis only).
    pub environment_id: Option<u32>,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            max_retries: 15,
            poll_interval_secs: None,
            environment_id: None,
        }
    }
}

impl RemoteSection {
    fn to_remote_config(
        &self,
        engine: &str,
        default_base_url: &str,
        default_interval: Duration,
    ) -> Result<RemoteConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                engine: engine.to_string(),
            })?;

        let interval = self
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(default_interval);

        Ok(RemoteConfig::new(
            api_key,
            self.base_url.as_deref().unwrap_or(default_base_url),
        )
        .with_timeout(Duration::from_secs(self.timeout_secs))
        .with_poll(PollPolicy::new(interval, self.max_retries)))
    }
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseToml {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Loads `path` if given, else the defaults, then applies API keys from
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Replaces API keys with `SCANWATCH_<ENGINE>_API_KEY` values found by
    /// `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (engine, section) in self.remote_sections_mut() {
            let var = format!("{}{}_API_KEY", API_KEY_ENV_PREFIX, engine.to_uppercase());
            if let Some(key) = lookup(&var).filter(|k| !k.is_empty()) {
                tracing::debug!(engine, var = %var, "API key taken from environment");
                section.api_key = Some(SecretString::from(key));
            }
        }
    }

    fn remote_sections_mut(&mut self) -> [(&'static str, &mut RemoteSection); 3] {
        [
            ("virustotal", &mut self.engines.virustotal),
            ("metadefender", &mut self.engines.metadefender),
            ("hybrid_analysis", &mut self.engines.hybrid_analysis),
        ]
    }

    /// Returns the dispatcher settings.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new().with_deadline(Duration::from_secs(self.dispatcher.deadline_secs))
    }

    /// Builds the enabled engines in a fixed order: clamscan, VirusTotal,
    /// MetaDefender, Hybrid Analysis.
    pub fn build_engines(&self) -> Result<Vec<ArcEngine>, ScanError> {
        let mut engines: Vec<ArcEngine> = Vec::new();
        let engines_cfg = &self.engines;

        if engines_cfg.clamscan.enabled {
            engines.push(Arc::new(ClamscanEngine::new(
                engines_cfg.clamscan.to_engine_config(),
            )));
        }

        if engines_cfg.virustotal.enabled {
            let config = engines_cfg
                .virustotal
                .to_remote_config(
                    "virustotal",
                    virustotal::DEFAULT_BASE_URL,
                    Duration::from_secs(5),
                )
                .map_err(config_error)?;
            engines.push(Arc::new(VirusTotalProvider::engine(config)?));
        }

        if engines_cfg.metadefender.enabled {
            let config = engines_cfg
                .metadefender
                .to_remote_config(
                    "metadefender",
                    metadefender::DEFAULT_BASE_URL,
                    Duration::from_secs(2),
                )
                .map_err(config_error)?;
            engines.push(Arc::new(MetaDefenderProvider::engine(config)?));
        }

        if engines_cfg.hybrid_analysis.enabled {
            let section = &engines_cfg.hybrid_analysis;
            let config = section
                .to_remote_config(
                    "hybrid_analysis",
                    hybrid_analysis::DEFAULT_BASE_URL,
                    Duration::from_secs(5),
                )
                .map_err(config_error)?;
            let mut engine = HybridAnalysisProvider::engine(config)?;
            if let Some(environment_id) = section.environment_id {
                engine = engine.map_provider(|p| p.with_environment_id(environment_id));
            }
            engines.push(Arc::new(engine));
        }

        if engines.is_empty() {
            return Err(ScanError::NoEngines);
        }
        Ok(engines)
    }
}

fn config_error(err: ConfigError) -> ScanError {
    ScanError::configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Engine;

    #[test]
    fn test_defaults_are_clamscan_only() {
        let config = Config::default();
        let engines = config.build_engines().unwrap();

        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].name(), "clamscan");
        assert_eq!(config.dispatcher_config().deadline, Duration::from_secs(180));
        assert_eq!(config.quarantine.user, "AVsecure");
        assert_eq!(config.history.path, Some(PathBuf::from("data.json")));
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(
            r#"
            [dispatcher]
            deadline_secs = 30

            [quarantine]
            directory = "/var/quarantine"

            [alerts]
            webhook_url = "https://chat.example.com/hook"

            [engines.clamscan]
            enabled = false

            [engines.metadefender]
            enabled = true
            api_key = "md-key"
            max_retries = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.deadline_secs, 30);
        assert_eq!(
            config.quarantine.directory,
            Some(PathBuf::from("/var/quarantine"))
        );
        assert_eq!(config.alerts.timeout_secs, 10);

        let engines = config.build_engines().unwrap();
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].name(), "metadefender");
    }

    #[test]
    fn test_enabled_remote_without_key_fails() {
        let config: Config = toml::from_str(
            r#"
            [engines.virustotal]
            enabled = true
            "#,
        )
        .unwrap();

        let err = config.build_engines().unwrap_err();
        assert!(matches!(err, ScanError::Configuration { .. }));
        assert!(err.to_string().contains("virustotal"));
    }

    #[test]
    fn test_env_override() {
        let mut config: Config = toml::from_str(
            r#"
            [engines.hybrid_analysis]
            enabled = true
            api_key = "from-file"
            "#,
        )
        .unwrap();

        config.apply_env_overrides(|name| {
            (name == "SCANWATCH_HYBRID_ANALYSIS_API_KEY").then(|| "from-env".to_string())
        });

        let key = config.engines.hybrid_analysis.api_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "from-env");
    }

    #[test]
    fn test_remote_poll_settings() {
        let section = RemoteSection {
            api_key: Some(SecretString::from("k".to_string())),
            max_retries: 3,
            ..RemoteSection::default()
        };
        let remote = section
            .to_remote_config("metadefender", "https://md.example/", Duration::from_secs(2))
            .unwrap();

        assert_eq!(remote.poll, PollPolicy::new(Duration::from_secs(2), 3));
        assert_eq!(remote.endpoint(), "https://md.example");
    }

    #[test]
    fn test_all_engines_disabled() {
        let mut config = Config::default();
        config.engines.clamscan.enabled = false;
        assert!(matches!(config.build_engines(), Err(ScanError::NoEngines)));
    }

    #[test]
    fn test_unreadable_file() {
        let err = Config::from_file(Path::new("/nonexistent/scanwatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
