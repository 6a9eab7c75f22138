use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::AuthSpec;

/// Default account-management API endpoint.
pub const DEFAULT_ACCOUNT_API_URL: &str = "https://api.opsgrid.io";

/// Identity and credentials of one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub name: String,
    pub account_uuid: String,
    #[serde(default)]
    pub api_url: Option<String>,
    pub auth: AuthSpec,
}

impl AccountInfo {
    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_ACCOUNT_API_URL)
    }
}

/// Reference to a policy or group: either a local id declared in the same
/// bundle, or the literal name of a pre-existing remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref {
    Local { reference: String },
    Name(String),
}

impl Ref {
    /// The key this reference resolves through in the local→remote id map.
    pub fn key(&self) -> &str {
        match self {
            Ref::Local { reference } => reference,
            Ref::Name(name) => name,
        }
    }
}

/// Scope of a policy: the whole account or one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PolicyLevel {
    Account,
    #[serde(rename_all = "camelCase")]
    Environment { environment: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    pub level: PolicyLevel,
    #[serde(default)]
    pub description: String,
    /// The policy statement text.
    pub policy: String,
    #[serde(default)]
    pub origin_object_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAccountBindings {
    #[serde(default)]
    pub policies: Vec<Ref>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEnvironmentBindings {
    pub environment: String,
    #[serde(default)]
    pub policies: Vec<Ref>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupManagementZoneBindings {
    pub environment: String,
    pub management_zone: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub account: Option<GroupAccountBindings>,
    #[serde(default)]
    pub environments: Vec<GroupEnvironmentBindings>,
    #[serde(default)]
    pub management_zones: Vec<GroupManagementZoneBindings>,
    #[serde(default)]
    pub origin_object_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub groups: Vec<Ref>,
}

/// Everything declared for one account: policies and groups keyed by local
/// id, users keyed by email. Local ids are unique within the bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResources {
    pub account: AccountInfo,
    #[serde(default)]
    pub policies: IndexMap<String, Policy>,
    #[serde(default)]
    pub groups: IndexMap<String, Group>,
    #[serde(default)]
    pub users: IndexMap<String, User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_parses_both_shapes() {
        let local: Ref = serde_json::from_str(r#"{"reference": "ops-policy"}"#).expect("local ref");
        assert_eq!(local, Ref::Local { reference: "ops-policy".to_string() });
        assert_eq!(local.key(), "ops-policy");

        let name: Ref = serde_json::from_str(r#""Pre-existing policy""#).expect("name ref");
        assert_eq!(name, Ref::Name("Pre-existing policy".to_string()));
        assert_eq!(name.key(), "Pre-existing policy");
    }

    #[test]
    fn policy_level_parses_environment_variant() {
        let level: PolicyLevel =
            serde_json::from_str(r#"{"type": "environment", "environment": "staging"}"#)
                .expect("environment level");
        assert_eq!(
            level,
            PolicyLevel::Environment {
                environment: "staging".to_string()
            }
        );
    }

    #[test]
    fn account_api_url_defaults() {
        let info = AccountInfo {
            name: "main".to_string(),
            account_uuid: "acc-1".to_string(),
            api_url: None,
            auth: AuthSpec::Token {
                token_var: "ACCOUNT_TOKEN".to_string(),
            },
        };
        assert_eq!(info.api_url(), DEFAULT_ACCOUNT_API_URL);
    }
}
