use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::account::types::{AccountInfo, Group, Policy};
use crate::error::{DeployerError, Result};
use crate::rest::RestClient;

/// A policy as the account-management API reports it.
#[derive(Debug, Clone)]
pub struct RemotePolicy {
    pub uuid: String,
    pub name: String,
    pub level_type: String,
    pub level_id: String,
}

/// A group as the account-management API reports it. `owner` distinguishes
/// locally managed groups from SCIM- and ALL_USERS-provisioned ones.
#[derive(Debug, Clone)]
pub struct RemoteGroup {
    pub uuid: String,
    pub name: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteManagementZone {
    pub environment: String,
    pub name: String,
    pub id: String,
}

/// One permission record of a group's overwrite list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub name: String,
    pub scope: String,
    pub scope_type: String,
}

/// Facade over the account-management REST surface.
#[async_trait]
pub trait AccountClient: Send + Sync {
    async fn get_policies(&self) -> Result<Vec<RemotePolicy>>;
    async fn get_groups(&self) -> Result<Vec<RemoteGroup>>;
    async fn get_management_zones(&self) -> Result<Vec<RemoteManagementZone>>;
    async fn environment_names(&self) -> Result<Vec<String>>;

    async fn create_policy(
        &self,
        level_type: &str,
        level_id: &str,
        policy: &Policy,
    ) -> Result<RemotePolicy>;
    async fn update_policy(
        &self,
        level_type: &str,
        level_id: &str,
        uuid: &str,
        policy: &Policy,
    ) -> Result<()>;

    async fn create_group(&self, group: &Group) -> Result<RemoteGroup>;
    async fn update_group(&self, uuid: &str, group: &Group) -> Result<()>;

    /// `None` when the user does not exist on the account.
    async fn get_user(&self, email: &str) -> Result<Option<Value>>;
    async fn create_user(&self, email: &str) -> Result<()>;

    async fn update_account_policy_bindings(
        &self,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()>;
    async fn update_environment_policy_bindings(
        &self,
        environment: &str,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()>;
    /// Full reconciliation for groups declaring no environment bindings.
    async fn delete_all_environment_policy_bindings(&self, group_uuid: &str) -> Result<()>;

    async fn update_group_permissions(
        &self,
        group_uuid: &str,
        permissions: &[PermissionRecord],
    ) -> Result<()>;
    async fn update_user_groups(&self, email: &str, group_uuids: &[String]) -> Result<()>;
}

/// Live implementation over the account-management API.
pub struct HttpAccountClient {
    rest: Arc<RestClient>,
    account_uuid: String,
}

impl HttpAccountClient {
    pub fn new(account: &AccountInfo, insecure: bool) -> Result<Self> {
        let auth = account.auth.resolve(&account.name)?;
        let base = if account.api_url().ends_with('/') {
            account.api_url().to_string()
        } else {
            format!("{}/", account.api_url())
        };
        let rest = Arc::new(RestClient::new(&base, auth, insecure)?);
        Ok(Self {
            rest,
            account_uuid: account.account_uuid.clone(),
        })
    }

    fn policy_body(policy: &Policy) -> Value {
        json!({
            "name": policy.name,
            "description": policy.description,
            "statementQuery": policy.policy,
        })
    }

    fn group_body(group: &Group) -> Value {
        json!({
            "name": group.name,
            "description": group.description,
        })
    }
}

#[async_trait]
impl AccountClient for HttpAccountClient {
    async fn get_policies(&self) -> Result<Vec<RemotePolicy>> {
        let path = format!("iam/v1/accounts/{}/policies", self.account_uuid);
        let response = self.rest.get(&path, &[]).await?;
        let listing: Value = response.json()?;
        let policies = listing
            .get("policies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(policies
            .iter()
            .filter_map(|entry| {
                Some(RemotePolicy {
                    uuid: entry.get("uuid").and_then(Value::as_str)?.to_string(),
                    name: entry.get("name").and_then(Value::as_str)?.to_string(),
                    level_type: entry
                        .get("levelType")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    level_id: entry
                        .get("levelId")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect())
    }

    async fn get_groups(&self) -> Result<Vec<RemoteGroup>> {
        let path = format!("iam/v1/accounts/{}/groups", self.account_uuid);
        let response = self.rest.get(&path, &[]).await?;
        let listing: Value = response.json()?;
        let groups = listing
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(groups
            .iter()
            .filter_map(|entry| {
                Some(RemoteGroup {
                    uuid: entry.get("uuid").and_then(Value::as_str)?.to_string(),
                    name: entry.get("name").and_then(Value::as_str)?.to_string(),
                    owner: entry
                        .get("owner")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect())
    }

    async fn get_management_zones(&self) -> Result<Vec<RemoteManagementZone>> {
        let path = format!("env/v2/accounts/{}/environments", self.account_uuid);
        let response = self.rest.get(&path, &[]).await?;
        let listing: Value = response.json()?;
        let environments = listing
            .get("environments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut zones = Vec::new();
        for environment in &environments {
            let Some(env_name) = environment.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(mzones) = environment.get("managementZones").and_then(Value::as_array)
            else {
                continue;
            };
            for zone in mzones {
                if let (Some(name), Some(id)) = (
                    zone.get("name").and_then(Value::as_str),
                    zone.get("id").and_then(Value::as_str),
                ) {
                    zones.push(RemoteManagementZone {
                        environment: env_name.to_string(),
                        name: name.to_string(),
                        id: id.to_string(),
                    });
                }
            }
        }
        Ok(zones)
    }

    async fn environment_names(&self) -> Result<Vec<String>> {
        let path = format!("env/v2/accounts/{}/environments", self.account_uuid);
        let response = self.rest.get(&path, &[]).await?;
        let listing: Value = response.json()?;
        Ok(listing
            .get("environments")
            .and_then(Value::as_array)
            .map(|environments| {
                environments
                    .iter()
                    .filter_map(|entry| entry.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_policy(
        &self,
        level_type: &str,
        level_id: &str,
        policy: &Policy,
    ) -> Result<RemotePolicy> {
        let path = format!("iam/v1/repo/{level_type}/{level_id}/policies");
        let response = self.rest.post(&path, &[], &Self::policy_body(policy)).await?;
        let created: Value = response.json()?;
        let uuid = created
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployerError::Other(format!(
                    "policy create response carried no uuid: {}",
                    response.body
                ))
            })?
            .to_string();
        Ok(RemotePolicy {
            uuid,
            name: policy.name.clone(),
            level_type: level_type.to_string(),
            level_id: level_id.to_string(),
        })
    }

    async fn update_policy(
        &self,
        level_type: &str,
        level_id: &str,
        uuid: &str,
        policy: &Policy,
    ) -> Result<()> {
        let path = format!("iam/v1/repo/{level_type}/{level_id}/policies/{uuid}");
        self.rest.put(&path, &[], &Self::policy_body(policy)).await?;
        Ok(())
    }

    async fn create_group(&self, group: &Group) -> Result<RemoteGroup> {
        let path = format!("iam/v1/accounts/{}/groups", self.account_uuid);
        let response = self.rest.post(&path, &[], &Self::group_body(group)).await?;
        let created: Value = response.json()?;
        let uuid = created
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployerError::Other(format!(
                    "group create response carried no uuid: {}",
                    response.body
                ))
            })?
            .to_string();
        Ok(RemoteGroup {
            uuid,
            name: group.name.clone(),
            owner: None,
        })
    }

    async fn update_group(&self, uuid: &str, group: &Group) -> Result<()> {
        let path = format!("iam/v1/accounts/{}/groups/{uuid}", self.account_uuid);
        self.rest.put(&path, &[], &Self::group_body(group)).await?;
        Ok(())
    }

    async fn get_user(&self, email: &str) -> Result<Option<Value>> {
        let path = format!("iam/v1/accounts/{}/users/{email}", self.account_uuid);
        match self.rest.get(&path, &[]).await {
            Ok(response) => Ok(Some(response.json()?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_user(&self, email: &str) -> Result<()> {
        let path = format!("iam/v1/accounts/{}/users", self.account_uuid);
        self.rest.post(&path, &[], &json!({ "email": email })).await?;
        Ok(())
    }

    async fn update_account_policy_bindings(
        &self,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()> {
        let path = format!(
            "iam/v1/repo/account/{}/bindings/groups/{group_uuid}",
            self.account_uuid
        );
        self.rest
            .put(&path, &[], &json!({ "policyUuids": policy_uuids }))
            .await?;
        Ok(())
    }

    async fn update_environment_policy_bindings(
        &self,
        environment: &str,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()> {
        let path = format!("iam/v1/repo/environment/{environment}/bindings/groups/{group_uuid}");
        self.rest
            .put(&path, &[], &json!({ "policyUuids": policy_uuids }))
            .await?;
        Ok(())
    }

    async fn delete_all_environment_policy_bindings(&self, group_uuid: &str) -> Result<()> {
        for environment in self.environment_names().await? {
            let path =
                format!("iam/v1/repo/environment/{environment}/bindings/groups/{group_uuid}");
            match self.rest.delete(&path).await {
                Ok(_) => {}
                // Nothing bound in this environment.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn update_group_permissions(
        &self,
        group_uuid: &str,
        permissions: &[PermissionRecord],
    ) -> Result<()> {
        let path = format!(
            "iam/v1/accounts/{}/groups/{group_uuid}/permissions",
            self.account_uuid
        );
        let body: Vec<Value> = permissions
            .iter()
            .map(|record| {
                json!({
                    "permissionName": record.name,
                    "scope": record.scope,
                    "scopeType": record.scope_type,
                })
            })
            .collect();
        self.rest.put(&path, &[], &Value::Array(body)).await?;
        Ok(())
    }

    async fn update_user_groups(&self, email: &str, group_uuids: &[String]) -> Result<()> {
        let path = format!("iam/v1/accounts/{}/users/{email}/groups", self.account_uuid);
        self.rest
            .put(&path, &[], &json!(group_uuids))
            .await?;
        Ok(())
    }
}

/// Dry-run account client: fetches return nothing, writes succeed with
/// synthetic uuids, nothing leaves the process.
pub struct DryRunAccountClient;

#[async_trait]
impl AccountClient for DryRunAccountClient {
    async fn get_policies(&self) -> Result<Vec<RemotePolicy>> {
        Ok(Vec::new())
    }

    async fn get_groups(&self) -> Result<Vec<RemoteGroup>> {
        Ok(Vec::new())
    }

    async fn get_management_zones(&self) -> Result<Vec<RemoteManagementZone>> {
        Ok(Vec::new())
    }

    async fn environment_names(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn create_policy(
        &self,
        level_type: &str,
        level_id: &str,
        policy: &Policy,
    ) -> Result<RemotePolicy> {
        Ok(RemotePolicy {
            uuid: format!("dryrun-policy-{}", policy.name),
            name: policy.name.clone(),
            level_type: level_type.to_string(),
            level_id: level_id.to_string(),
        })
    }

    async fn update_policy(
        &self,
        _level_type: &str,
        _level_id: &str,
        _uuid: &str,
        _policy: &Policy,
    ) -> Result<()> {
        Ok(())
    }

    async fn create_group(&self, group: &Group) -> Result<RemoteGroup> {
        Ok(RemoteGroup {
            uuid: format!("dryrun-group-{}", group.name),
            name: group.name.clone(),
            owner: None,
        })
    }

    async fn update_group(&self, _uuid: &str, _group: &Group) -> Result<()> {
        Ok(())
    }

    async fn get_user(&self, _email: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn create_user(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn update_account_policy_bindings(
        &self,
        _group_uuid: &str,
        _policy_uuids: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn update_environment_policy_bindings(
        &self,
        _environment: &str,
        _group_uuid: &str,
        _policy_uuids: &[String],
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_all_environment_policy_bindings(&self, _group_uuid: &str) -> Result<()> {
        Ok(())
    }

    async fn update_group_permissions(
        &self,
        _group_uuid: &str,
        _permissions: &[PermissionRecord],
    ) -> Result<()> {
        Ok(())
    }

    async fn update_user_groups(&self, _email: &str, _group_uuids: &[String]) -> Result<()> {
        Ok(())
    }
}
