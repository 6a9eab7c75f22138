use std::env;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::{DeployerError, Result};

/// Worker pool size when `CONCURRENT_REQUESTS` is unset or unparsable.
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 5;

/// Available CLI actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Validate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Deploy => "deploy",
            Action::Validate => "validate",
        }
    }
}

/// Per-command arguments.
#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Path to the project manifest (JSON produced by the authoring layer).
    #[arg(long)]
    pub manifest: PathBuf,

    /// Restrict the run to the named environments (defaults to all).
    #[arg(long = "environment")]
    pub environments: Vec<String>,

    /// Evaluate everything but issue no live writes.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Keep deploying remaining environments after one fails.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,
}

/// Top-level CLI structure.
#[derive(Debug, Parser)]
#[command(
    name = "opsgrid-deployer",
    version,
    about = "Deploys configuration-as-code projects to Opsgrid environments.",
    long_about = "Reconciles locally authored configurations (settings, dashboards, documents, automations, buckets, open-pipelines, account IAM) against one or more Opsgrid environments. Deployment is upsert-only and ordered along configuration references."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the project to its environments.
    Deploy(ActionArgs),
    /// Validate references and dependency ordering without deploying.
    Validate(ActionArgs),
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging knobs, read once from the environment.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub format: LogFormat,
    pub color: bool,
    pub time: bool,
    pub source: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            color: true,
            time: true,
            source: false,
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let format = match get_env("OPSGRID_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Self {
            format,
            color: env_bool(&get_env, "OPSGRID_LOG_COLOR", defaults.color),
            time: env_bool(&get_env, "OPSGRID_LOG_TIME", defaults.time),
            source: env_bool(&get_env, "OPSGRID_LOG_SOURCE", defaults.source),
        }
    }
}

/// Feature toggles. Read once at entry and injected everywhere; the core
/// holds no process-global flag registry.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// Derive the classic API base URL from the platform URL instead of
    /// requiring an explicit classic URL per environment.
    pub simple_classic_url: bool,
    pub documents_enabled: bool,
    pub open_pipeline_enabled: bool,
    /// Leave SCIM- and ALL_USERS-owned groups untouched during IAM deploys.
    pub skip_readonly_group_updates: bool,
    /// Publish the legacy numeric id for management-zone settings objects.
    pub mz_numeric_ids: bool,
    pub insecure_skip_verify: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            simple_classic_url: false,
            documents_enabled: true,
            open_pipeline_enabled: true,
            skip_readonly_group_updates: false,
            mz_numeric_ids: true,
            insecure_skip_verify: false,
        }
    }
}

impl FeatureFlags {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            simple_classic_url: env_bool(
                &get_env,
                "OPSGRID_FEAT_SIMPLE_CLASSIC_URL",
                defaults.simple_classic_url,
            ),
            documents_enabled: env_bool(
                &get_env,
                "OPSGRID_FEAT_DOCUMENTS",
                defaults.documents_enabled,
            ),
            open_pipeline_enabled: env_bool(
                &get_env,
                "OPSGRID_FEAT_OPENPIPELINE",
                defaults.open_pipeline_enabled,
            ),
            skip_readonly_group_updates: env_bool(
                &get_env,
                "OPSGRID_FEAT_SKIP_READONLY_GROUPS",
                defaults.skip_readonly_group_updates,
            ),
            mz_numeric_ids: env_bool(
                &get_env,
                "OPSGRID_FEAT_MZ_NUMERIC_IDS",
                defaults.mz_numeric_ids,
            ),
            insecure_skip_verify: env_bool(
                &get_env,
                "OPSGRID_INSECURE_SKIP_VERIFY",
                defaults.insecure_skip_verify,
            ),
        }
    }
}

fn env_bool<F>(get_env: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(key) {
        Some(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

/// Complete configuration used by the deployer.
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    pub action: Action,
    pub manifest: PathBuf,
    pub environments: Vec<String>,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub concurrent_requests: usize,
    pub flags: FeatureFlags,
    pub log: LogSettings,
}

impl DeployerConfig {
    pub fn from_env_and_args(cli: CliArgs) -> Result<Self> {
        let (action, args) = match cli.command {
            Command::Deploy(args) => (Action::Deploy, args),
            Command::Validate(args) => (Action::Validate, args),
        };

        if !args.manifest.exists() {
            return Err(DeployerError::Config(format!(
                "manifest {} does not exist",
                args.manifest.display()
            )));
        }

        Ok(Self {
            action,
            manifest: args.manifest,
            environments: args.environments,
            // Validation never writes, so it runs as a dry-run.
            dry_run: args.dry_run || action == Action::Validate,
            continue_on_error: args.continue_on_error,
            concurrent_requests: concurrent_requests_from_env(|key| env::var(key).ok()),
            flags: FeatureFlags::from_env(),
            log: LogSettings::from_env(),
        })
    }
}

pub fn concurrent_requests_from_env<F>(get_env: F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    get_env("CONCURRENT_REQUESTS")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&value| value > 0)
        .unwrap_or(DEFAULT_CONCURRENT_REQUESTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_defaults_to_five() {
        assert_eq!(concurrent_requests_from_env(|_| None), 5);
    }

    #[test]
    fn pool_size_reads_env_var() {
        let size = concurrent_requests_from_env(|key| {
            (key == "CONCURRENT_REQUESTS").then(|| "12".to_string())
        });
        assert_eq!(size, 12);
    }

    #[test]
    fn pool_size_ignores_garbage_and_zero() {
        assert_eq!(
            concurrent_requests_from_env(|_| Some("banana".to_string())),
            5
        );
        assert_eq!(concurrent_requests_from_env(|_| Some("0".to_string())), 5);
    }

    #[test]
    fn feature_flags_default_and_override() {
        let defaults = FeatureFlags::from_env_with(|_| None);
        assert!(!defaults.simple_classic_url);
        assert!(defaults.documents_enabled);
        assert!(!defaults.skip_readonly_group_updates);

        let flipped = FeatureFlags::from_env_with(|key| match key {
            "OPSGRID_FEAT_SIMPLE_CLASSIC_URL" => Some("true".to_string()),
            "OPSGRID_FEAT_DOCUMENTS" => Some("false".to_string()),
            "OPSGRID_FEAT_SKIP_READONLY_GROUPS" => Some("1".to_string()),
            _ => None,
        });
        assert!(flipped.simple_classic_url);
        assert!(!flipped.documents_enabled);
        assert!(flipped.skip_readonly_group_updates);
    }

    #[test]
    fn log_settings_read_format_and_toggles() {
        let settings = LogSettings::from_env_with(|key| match key {
            "OPSGRID_LOG_FORMAT" => Some("json".to_string()),
            "OPSGRID_LOG_COLOR" => Some("false".to_string()),
            _ => None,
        });
        assert_eq!(settings.format, LogFormat::Json);
        assert!(!settings.color);
        assert!(settings.time);
    }
}
