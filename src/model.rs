use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::account::types::AccountResources;
use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};

/// Type tag of a configuration, carrying the type-specific identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfigType {
    #[serde(rename_all = "camelCase")]
    Settings {
        schema_id: String,
        schema_version: String,
        scope: String,
    },
    #[serde(rename_all = "camelCase")]
    Classic { api: String },
    #[serde(rename_all = "camelCase")]
    Document { document_kind: DocumentKind },
    Bucket,
    #[serde(rename_all = "camelCase")]
    Automation { resource: AutomationResource },
    #[serde(rename_all = "camelCase")]
    OpenPipeline { pipeline_kind: String },
}

impl ConfigType {
    /// Short tag used in coordinates and log lines.
    pub fn tag(&self) -> String {
        match self {
            ConfigType::Settings { schema_id, .. } => schema_id.clone(),
            ConfigType::Classic { api } => api.clone(),
            ConfigType::Document { .. } => "document".to_string(),
            ConfigType::Bucket => "bucket".to_string(),
            ConfigType::Automation { resource } => resource.as_str().to_string(),
            ConfigType::OpenPipeline { .. } => "openpipeline".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    Dashboard,
    Notebook,
    Launchpad,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Dashboard => "dashboard",
            DocumentKind::Notebook => "notebook",
            DocumentKind::Launchpad => "launchpad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationResource {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

impl AutomationResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomationResource::Workflow => "workflow",
            AutomationResource::BusinessCalendar => "business-calendar",
            AutomationResource::SchedulingRule => "scheduling-rule",
        }
    }
}

/// Which field of a resolved entity a reference parameter extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceProperty {
    #[default]
    Id,
    Name,
}

/// A single configuration parameter. References to other configs form a DAG
/// rooted at the configs of one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Parameter {
    #[serde(rename_all = "camelCase")]
    Value { value: serde_json::Value },
    #[serde(rename_all = "camelCase")]
    Reference {
        coordinate: Coordinate,
        #[serde(default)]
        property: ReferenceProperty,
    },
    #[serde(rename_all = "camelCase")]
    Environment {
        name: String,
        #[serde(rename = "default", default)]
        default_value: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Compound {
        format: String,
        references: Vec<String>,
    },
}

/// A configuration as produced by the (out-of-scope) project loader. Never
/// mutated by the deploy core; resolved values live in a separate properties
/// map returned alongside the ResolvedEntity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ConfigManifest", into = "ConfigManifest")]
pub struct Config {
    pub coordinate: Coordinate,
    pub config_type: ConfigType,
    pub environment: String,
    pub group: String,
    pub template: String,
    pub parameters: IndexMap<String, Parameter>,
    pub origin_object_id: Option<String>,
    pub skip: bool,
}

impl Config {
    /// Coordinates of all configurations this config depends on.
    pub fn references(&self) -> Vec<Coordinate> {
        let mut refs: Vec<Coordinate> = Vec::new();
        for parameter in self.parameters.values() {
            if let Parameter::Reference { coordinate, .. } = parameter
                && !refs.contains(coordinate)
            {
                refs.push(coordinate.clone());
            }
        }
        refs
    }

    /// True when any reference points at a config of the given type tag.
    pub fn references_type(&self, type_tag: &str) -> bool {
        self.references()
            .iter()
            .any(|coord| coord.config_type == type_tag)
    }
}

/// Wire shape of a config entry in the project manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigManifest {
    project: String,
    config_id: String,
    #[serde(flatten)]
    config_type: ConfigType,
    environment: String,
    #[serde(default)]
    group: Option<String>,
    template: String,
    #[serde(default)]
    parameters: IndexMap<String, Parameter>,
    #[serde(default)]
    origin_object_id: Option<String>,
    #[serde(default)]
    skip: bool,
}

impl From<ConfigManifest> for Config {
    fn from(raw: ConfigManifest) -> Self {
        let coordinate = Coordinate::new(
            raw.project,
            raw.config_type.tag(),
            raw.config_id,
        );
        Config {
            coordinate,
            config_type: raw.config_type,
            environment: raw.environment,
            group: raw.group.unwrap_or_else(|| "default".to_string()),
            template: raw.template,
            parameters: raw.parameters,
            origin_object_id: raw.origin_object_id,
            skip: raw.skip,
        }
    }
}

impl From<Config> for ConfigManifest {
    fn from(config: Config) -> Self {
        ConfigManifest {
            project: config.coordinate.project,
            config_id: config.coordinate.config_id,
            config_type: config.config_type,
            environment: config.environment,
            group: Some(config.group),
            template: config.template,
            parameters: config.parameters,
            origin_object_id: config.origin_object_id,
            skip: config.skip,
        }
    }
}

/// How credentials for an environment are discovered. The deploy core only
/// reads the named variables; credential management itself is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthSpec {
    #[serde(rename_all = "camelCase")]
    Token { token_var: String },
    #[serde(rename = "oauth", rename_all = "camelCase")]
    OAuth {
        client_id_var: String,
        client_secret_var: String,
        token_url: String,
    },
}

/// Resolved credentials for one environment.
#[derive(Debug, Clone)]
pub enum Auth {
    Token { token: String },
    OAuth {
        client_id: String,
        client_secret: String,
        token_url: String,
    },
}

impl AuthSpec {
    /// Resolve the credential indirection. Missing variables are a fatal
    /// pre-flight error; no deploy starts with incomplete credentials.
    pub fn resolve(&self, environment: &str) -> Result<Auth> {
        self.resolve_with_env(environment, |key| env::var(key).ok())
    }

    pub fn resolve_with_env<F>(&self, environment: &str, get_env: F) -> Result<Auth>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            AuthSpec::Token { token_var } => {
                let token = get_env(token_var).ok_or_else(|| {
                    DeployerError::Auth(format!(
                        "environment {environment}: token variable '{token_var}' is not set"
                    ))
                })?;
                Ok(Auth::Token { token })
            }
            AuthSpec::OAuth {
                client_id_var,
                client_secret_var,
                token_url,
            } => {
                let client_id = get_env(client_id_var).ok_or_else(|| {
                    DeployerError::Auth(format!(
                        "environment {environment}: OAuth client id variable '{client_id_var}' is not set"
                    ))
                })?;
                let client_secret = get_env(client_secret_var).ok_or_else(|| {
                    DeployerError::Auth(format!(
                        "environment {environment}: OAuth client secret variable '{client_secret_var}' is not set"
                    ))
                })?;
                Ok(Auth::OAuth {
                    client_id,
                    client_secret,
                    token_url: token_url.clone(),
                })
            }
        }
    }
}

/// A deployment target environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDefinition {
    pub name: String,
    pub url: String,
    /// Base URL of the classic API surface; derived from `url` when absent
    /// and the simple-classic-URL feature is enabled.
    #[serde(default)]
    pub classic_url: Option<String>,
    pub auth: AuthSpec,
}

/// The loaded project model: configurations, target environments, and
/// account resource bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub environments: Vec<EnvironmentDefinition>,
    #[serde(default)]
    pub configs: Vec<Config>,
    #[serde(default)]
    pub accounts: Vec<AccountResources>,
}

impl Project {
    pub fn from_manifest_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            DeployerError::Manifest(format!("cannot read {}: {err}", path.display()))
        })?;
        let project: Project = serde_json::from_str(&raw).map_err(|err| {
            DeployerError::Manifest(format!("cannot parse {}: {err}", path.display()))
        })?;
        project.validate()?;
        Ok(project)
    }

    /// Names of all environments referenced by at least one config.
    pub fn environment_names(&self) -> BTreeSet<String> {
        self.configs
            .iter()
            .map(|config| config.environment.clone())
            .collect()
    }

    pub fn configs_for_environment(&self, environment: &str) -> Vec<Config> {
        self.configs
            .iter()
            .filter(|config| config.environment == environment)
            .cloned()
            .collect()
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentDefinition> {
        self.environments.iter().find(|env| env.name == name)
    }

    fn validate(&self) -> Result<()> {
        for name in self.environment_names() {
            if self.environment(&name).is_none() {
                return Err(DeployerError::Manifest(format!(
                    "configs reference environment '{name}' but the manifest does not define it"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(coordinate: Coordinate) -> Parameter {
        Parameter::Reference {
            coordinate,
            property: ReferenceProperty::Id,
        }
    }

    fn sample_config() -> Config {
        let mut parameters = IndexMap::new();
        parameters.insert(
            "name".to_string(),
            Parameter::Value {
                value: serde_json::json!("Disk alerts"),
            },
        );
        parameters.insert(
            "bucket".to_string(),
            reference(Coordinate::new("infra", "bucket", "raw-logs")),
        );
        parameters.insert(
            "bucketAgain".to_string(),
            reference(Coordinate::new("infra", "bucket", "raw-logs")),
        );
        Config {
            coordinate: Coordinate::new("infra", "builtin:alerting.profile", "disk-alerts"),
            config_type: ConfigType::Settings {
                schema_id: "builtin:alerting.profile".to_string(),
                schema_version: "1.0".to_string(),
                scope: "environment".to_string(),
            },
            environment: "staging".to_string(),
            group: "default".to_string(),
            template: "{}".to_string(),
            parameters,
            origin_object_id: None,
            skip: false,
        }
    }

    #[test]
    fn references_are_deduplicated() {
        let config = sample_config();
        assert_eq!(
            config.references(),
            vec![Coordinate::new("infra", "bucket", "raw-logs")]
        );
    }

    #[test]
    fn detects_referenced_type() {
        let config = sample_config();
        assert!(config.references_type("bucket"));
        assert!(!config.references_type("application-web"));
    }

    #[test]
    fn config_manifest_round_trips() {
        let json = serde_json::json!({
            "project": "infra",
            "configId": "raw-logs",
            "kind": "bucket",
            "environment": "staging",
            "template": "{\"bucketName\": \"{{name}}\"}",
            "parameters": {
                "name": {"type": "value", "value": "raw_logs"}
            }
        });
        let config: Config = serde_json::from_value(json).expect("config parses");
        assert_eq!(config.coordinate, Coordinate::new("infra", "bucket", "raw-logs"));
        assert_eq!(config.group, "default");
        assert!(!config.skip);
    }

    #[test]
    fn auth_resolution_fails_on_missing_variable() {
        let spec = AuthSpec::Token {
            token_var: "STAGING_TOKEN".to_string(),
        };
        let err = spec
            .resolve_with_env("staging", |_| None)
            .expect_err("missing variable");
        assert!(format!("{err}").contains("STAGING_TOKEN"));
    }

    #[test]
    fn oauth_resolution_reads_both_variables() {
        let spec = AuthSpec::OAuth {
            client_id_var: "CID".to_string(),
            client_secret_var: "CSECRET".to_string(),
            token_url: "https://sso.example.com/token".to_string(),
        };
        let auth = spec
            .resolve_with_env("staging", |key| match key {
                "CID" => Some("id".to_string()),
                "CSECRET" => Some("secret".to_string()),
                _ => None,
            })
            .expect("auth resolves");
        match auth {
            Auth::OAuth { client_id, client_secret, .. } => {
                assert_eq!(client_id, "id");
                assert_eq!(client_secret, "secret");
            }
            other => panic!("expected oauth auth, got {other:?}"),
        }
    }
}
