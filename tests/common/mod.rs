#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use opsgrid_deployer::account::client::{
    AccountClient, PermissionRecord, RemoteGroup, RemoteManagementZone, RemotePolicy,
};
use opsgrid_deployer::account::types::{Group, Policy};
use opsgrid_deployer::api::ClassicApi;
use opsgrid_deployer::client::{
    AutomationClient, BucketClient, ClassicClient, ClientSet, DocumentClient, DocumentPayload,
    OpenPipelineClient, RemoteEntity, SettingsClient, SettingsObject, SettingsUpsertOptions,
};
use opsgrid_deployer::coordinate::Coordinate;
use opsgrid_deployer::error::{DeployerError, Result};
use opsgrid_deployer::model::{
    AuthSpec, AutomationResource, Config, ConfigType, DocumentKind, EnvironmentDefinition,
    Parameter, Project, ReferenceProperty,
};

/// One recorded client call.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub key: String,
    pub payload: String,
    pub detail: String,
}

/// Shared log of every call the recording clients received, plus programmed
/// failures keyed by entity name.
#[derive(Default)]
pub struct RecordingLog {
    pub events: Mutex<Vec<Event>>,
    failures: Mutex<HashMap<String, u16>>,
}

impl RecordingLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, key: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(key.to_string(), status);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn upsert_keys(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter(|event| event.kind.starts_with("upsert"))
            .map(|event| event.key.clone())
            .collect()
    }

    fn record(&self, kind: &str, key: &str, payload: String, detail: String) -> Result<()> {
        if let Some(status) = self.failures.lock().unwrap().get(key) {
            return Err(DeployerError::Api {
                status: *status,
                body: format!("programmed failure for {key}"),
            });
        }
        self.events.lock().unwrap().push(Event {
            kind: kind.to_string(),
            key: key.to_string(),
            payload,
            detail,
        });
        Ok(())
    }
}

struct Recorder {
    log: Arc<RecordingLog>,
}

pub fn recording_client_set(log: Arc<RecordingLog>) -> ClientSet {
    ClientSet {
        settings: Arc::new(Recorder { log: log.clone() }),
        classic: Arc::new(Recorder { log: log.clone() }),
        document: Arc::new(Recorder { log: log.clone() }),
        bucket: Arc::new(Recorder { log: log.clone() }),
        automation: Arc::new(Recorder { log: log.clone() }),
        open_pipeline: Arc::new(Recorder { log }),
    }
}

#[async_trait]
impl SettingsClient for Recorder {
    async fn upsert(
        &self,
        object: &SettingsObject,
        options: &SettingsUpsertOptions,
    ) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-settings",
            &object.name,
            object.content.to_string(),
            format!("{:?} {:?}", options.retry_setting, options.insert_position),
        )?;
        Ok(RemoteEntity {
            id: format!("r-{}", object.name),
            name: object.name.clone(),
        })
    }

    async fn list(&self, _schema_id: &str) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _object_id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ClassicClient for Recorder {
    async fn list(&self, _api: &ClassicApi) -> Result<Vec<RemoteEntity>> {
        Ok(Vec::new())
    }

    async fn create(&self, api: &ClassicApi, name: &str, payload: &Value) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-classic",
            name,
            payload.to_string(),
            format!("create {}", api.id),
        )?;
        Ok(RemoteEntity {
            id: format!("r-{name}"),
            name: name.to_string(),
        })
    }

    async fn update(
        &self,
        api: &ClassicApi,
        id: &str,
        name: &str,
        payload: &Value,
    ) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-classic",
            name,
            payload.to_string(),
            format!("update {} {}", api.id, id),
        )?;
        Ok(RemoteEntity {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    async fn delete(&self, _api: &ClassicApi, _id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for Recorder {
    async fn update(&self, id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-document",
            &document.name,
            document.content.to_string(),
            format!("update {id}"),
        )?;
        Ok(RemoteEntity {
            id: id.to_string(),
            name: document.name.clone(),
        })
    }

    async fn create(&self, external_id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-document",
            &document.name,
            document.content.to_string(),
            format!("create {external_id}"),
        )?;
        Ok(RemoteEntity {
            id: format!("r-{}", document.name),
            name: document.name.clone(),
        })
    }

    async fn list(&self, _kind: DocumentKind) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BucketClient for Recorder {
    async fn upsert(&self, bucket_name: &str, payload: &Value) -> Result<RemoteEntity> {
        self.log
            .record("upsert-bucket", bucket_name, payload.to_string(), String::new())?;
        Ok(RemoteEntity {
            id: format!("r-{bucket_name}"),
            name: bucket_name.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _bucket_name: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AutomationClient for Recorder {
    async fn upsert(
        &self,
        resource: AutomationResource,
        id: &str,
        payload: &Value,
    ) -> Result<RemoteEntity> {
        self.log.record(
            "upsert-automation",
            id,
            payload.to_string(),
            format!("{resource:?}"),
        )?;
        Ok(RemoteEntity {
            id: id.to_string(),
            name: id.to_string(),
        })
    }

    async fn list(&self, _resource: AutomationResource) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _resource: AutomationResource, _id: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OpenPipelineClient for Recorder {
    async fn upsert(&self, kind: &str, payload: &Value) -> Result<RemoteEntity> {
        self.log
            .record("upsert-openpipeline", kind, payload.to_string(), String::new())?;
        Ok(RemoteEntity {
            id: kind.to_string(),
            name: kind.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

// ---- project fixtures ------------------------------------------------------

pub const TEST_ENV: &str = "staging";

pub fn environment_definition() -> EnvironmentDefinition {
    EnvironmentDefinition {
        name: TEST_ENV.to_string(),
        url: "https://test.apps.opsgrid.io".to_string(),
        classic_url: None,
        auth: AuthSpec::Token {
            token_var: "TEST_TOKEN".to_string(),
        },
    }
}

pub fn bucket_coordinate(id: &str) -> Coordinate {
    Coordinate::new("infra", "bucket", id)
}

/// A bucket config whose parameters reference the given sibling buckets.
pub fn bucket_config(id: &str, references: &[&str]) -> Config {
    let mut parameters = IndexMap::new();
    for (i, reference) in references.iter().enumerate() {
        parameters.insert(
            format!("dep{i}"),
            Parameter::Reference {
                coordinate: bucket_coordinate(reference),
                property: ReferenceProperty::Id,
            },
        );
    }
    Config {
        coordinate: bucket_coordinate(id),
        config_type: ConfigType::Bucket,
        environment: TEST_ENV.to_string(),
        group: "default".to_string(),
        template: "{}".to_string(),
        parameters,
        origin_object_id: None,
        skip: false,
    }
}

pub fn settings_config(id: &str, template: &str, parameters: IndexMap<String, Parameter>) -> Config {
    Config {
        coordinate: Coordinate::new("infra", "builtin:alerting.profile", id),
        config_type: ConfigType::Settings {
            schema_id: "builtin:alerting.profile".to_string(),
            schema_version: "1.0".to_string(),
            scope: "environment".to_string(),
        },
        environment: TEST_ENV.to_string(),
        group: "default".to_string(),
        template: template.to_string(),
        parameters,
        origin_object_id: None,
        skip: false,
    }
}

pub fn project_with(configs: Vec<Config>) -> Project {
    Project {
        environments: vec![environment_definition()],
        configs,
        accounts: Vec::new(),
    }
}

// ---- account fixtures ------------------------------------------------------

/// Recording account client with programmable pre-existing remote state.
#[derive(Default)]
pub struct RecordingAccountClient {
    pub calls: Mutex<Vec<String>>,
    pub remote_policies: Mutex<Vec<RemotePolicy>>,
    pub remote_groups: Mutex<Vec<RemoteGroup>>,
    pub remote_zones: Mutex<Vec<RemoteManagementZone>>,
    pub existing_users: Mutex<HashSet<String>>,
}

impl RecordingAccountClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AccountClient for RecordingAccountClient {
    async fn get_policies(&self) -> Result<Vec<RemotePolicy>> {
        self.push("fetch:policies".to_string());
        Ok(self.remote_policies.lock().unwrap().clone())
    }

    async fn get_groups(&self) -> Result<Vec<RemoteGroup>> {
        self.push("fetch:groups".to_string());
        Ok(self.remote_groups.lock().unwrap().clone())
    }

    async fn get_management_zones(&self) -> Result<Vec<RemoteManagementZone>> {
        self.push("fetch:zones".to_string());
        Ok(self.remote_zones.lock().unwrap().clone())
    }

    async fn environment_names(&self) -> Result<Vec<String>> {
        Ok(vec![TEST_ENV.to_string()])
    }

    async fn create_policy(
        &self,
        level_type: &str,
        level_id: &str,
        policy: &Policy,
    ) -> Result<RemotePolicy> {
        self.push(format!("create:policy:{}", policy.name));
        Ok(RemotePolicy {
            uuid: format!("uuid-{}", policy.name),
            name: policy.name.clone(),
            level_type: level_type.to_string(),
            level_id: level_id.to_string(),
        })
    }

    async fn update_policy(
        &self,
        _level_type: &str,
        _level_id: &str,
        uuid: &str,
        policy: &Policy,
    ) -> Result<()> {
        self.push(format!("update:policy:{}:{uuid}", policy.name));
        Ok(())
    }

    async fn create_group(&self, group: &Group) -> Result<RemoteGroup> {
        self.push(format!("create:group:{}", group.name));
        Ok(RemoteGroup {
            uuid: format!("uuid-{}", group.name),
            name: group.name.clone(),
            owner: None,
        })
    }

    async fn update_group(&self, uuid: &str, group: &Group) -> Result<()> {
        self.push(format!("update:group:{}:{uuid}", group.name));
        Ok(())
    }

    async fn get_user(&self, email: &str) -> Result<Option<Value>> {
        let exists = self.existing_users.lock().unwrap().contains(email);
        Ok(exists.then(|| serde_json::json!({ "email": email })))
    }

    async fn create_user(&self, email: &str) -> Result<()> {
        self.push(format!("create:user:{email}"));
        Ok(())
    }

    async fn update_account_policy_bindings(
        &self,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()> {
        self.push(format!(
            "bind:account:{group_uuid}:{}",
            policy_uuids.join(",")
        ));
        Ok(())
    }

    async fn update_environment_policy_bindings(
        &self,
        environment: &str,
        group_uuid: &str,
        policy_uuids: &[String],
    ) -> Result<()> {
        self.push(format!(
            "bind:env:{environment}:{group_uuid}:{}",
            policy_uuids.join(",")
        ));
        Ok(())
    }

    async fn delete_all_environment_policy_bindings(&self, group_uuid: &str) -> Result<()> {
        self.push(format!("bind:delete-env:{group_uuid}"));
        Ok(())
    }

    async fn update_group_permissions(
        &self,
        group_uuid: &str,
        permissions: &[PermissionRecord],
    ) -> Result<()> {
        let rendered: Vec<String> = permissions
            .iter()
            .map(|record| format!("{}@{}/{}", record.name, record.scope_type, record.scope))
            .collect();
        self.push(format!("bind:permissions:{group_uuid}:{}", rendered.join(",")));
        Ok(())
    }

    async fn update_user_groups(&self, email: &str, group_uuids: &[String]) -> Result<()> {
        self.push(format!("bind:user-groups:{email}:{}", group_uuids.join(",")));
        Ok(())
    }
}
