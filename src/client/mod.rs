use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::ClassicApi;
use crate::config::FeatureFlags;
use crate::error::{DeployerError, Result};
use crate::model::{AutomationResource, DocumentKind, EnvironmentDefinition, Project};
use crate::resolve::InsertPosition;
use crate::retry::RetrySetting;

pub mod dryrun;
pub mod http;

/// The remote identity returned by every upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntity {
    pub id: String,
    pub name: String,
}

/// A settings 2.0 object ready for upsert.
#[derive(Debug, Clone)]
pub struct SettingsObject {
    pub name: String,
    pub schema_id: String,
    pub schema_version: String,
    pub scope: String,
    pub content: Value,
    pub origin_object_id: Option<String>,
    pub external_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpsertOptions {
    pub retry_setting: Option<RetrySetting>,
    pub insert_position: Option<InsertPosition>,
}

#[async_trait]
pub trait SettingsClient: Send + Sync {
    async fn upsert(
        &self,
        object: &SettingsObject,
        options: &SettingsUpsertOptions,
    ) -> Result<RemoteEntity>;
    async fn list(&self, schema_id: &str) -> Result<Vec<Value>>;
    async fn delete(&self, object_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ClassicClient: Send + Sync {
    async fn list(&self, api: &ClassicApi) -> Result<Vec<RemoteEntity>>;
    async fn create(&self, api: &ClassicApi, name: &str, payload: &Value) -> Result<RemoteEntity>;
    async fn update(
        &self,
        api: &ClassicApi,
        id: &str,
        name: &str,
        payload: &Value,
    ) -> Result<RemoteEntity>;
    async fn delete(&self, api: &ClassicApi, id: &str) -> Result<()>;
}

/// A document (dashboard, notebook, launchpad) ready for upsert.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    pub kind: DocumentKind,
    pub name: String,
    pub content: Value,
}

#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Update an existing document by object id or external id. Not-found is
    /// surfaced as an API error with status 404 for the handler to fall back
    /// on.
    async fn update(&self, id: &str, document: &DocumentPayload) -> Result<RemoteEntity>;
    async fn create(&self, external_id: &str, document: &DocumentPayload) -> Result<RemoteEntity>;
    async fn list(&self, kind: DocumentKind) -> Result<Vec<Value>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait BucketClient: Send + Sync {
    async fn upsert(&self, bucket_name: &str, payload: &Value) -> Result<RemoteEntity>;
    async fn list(&self) -> Result<Vec<Value>>;
    async fn delete(&self, bucket_name: &str) -> Result<()>;
}

#[async_trait]
pub trait AutomationClient: Send + Sync {
    async fn upsert(
        &self,
        resource: AutomationResource,
        id: &str,
        payload: &Value,
    ) -> Result<RemoteEntity>;
    async fn list(&self, resource: AutomationResource) -> Result<Vec<Value>>;
    async fn delete(&self, resource: AutomationResource, id: &str) -> Result<()>;
}

#[async_trait]
pub trait OpenPipelineClient: Send + Sync {
    async fn upsert(&self, kind: &str, payload: &Value) -> Result<RemoteEntity>;
    async fn list(&self) -> Result<Vec<Value>>;
}

/// One client per API family, for one environment.
#[derive(Clone)]
pub struct ClientSet {
    pub settings: Arc<dyn SettingsClient>,
    pub classic: Arc<dyn ClassicClient>,
    pub document: Arc<dyn DocumentClient>,
    pub bucket: Arc<dyn BucketClient>,
    pub automation: Arc<dyn AutomationClient>,
    pub open_pipeline: Arc<dyn OpenPipelineClient>,
}

impl ClientSet {
    pub fn live(environment: &EnvironmentDefinition, flags: &FeatureFlags) -> Result<Self> {
        http::build_client_set(environment, flags)
    }

    pub fn dry_run() -> Self {
        dryrun::build_client_set()
    }
}

/// Clients for every environment of a run. Construction is the credential
/// pre-flight: a referenced environment without usable auth fails here,
/// before any deploy starts.
pub struct EnvironmentClients {
    sets: HashMap<String, ClientSet>,
}

impl EnvironmentClients {
    /// Wire explicit client sets, e.g. embedders and tests.
    pub fn from_sets(sets: HashMap<String, ClientSet>) -> Self {
        Self { sets }
    }

    pub fn live_for_project(project: &Project, flags: &FeatureFlags) -> Result<Self> {
        let mut sets = HashMap::new();
        for name in project.environment_names() {
            let definition = project.environment(&name).ok_or_else(|| {
                DeployerError::Config(format!("environment '{name}' is not defined"))
            })?;
            sets.insert(name.clone(), ClientSet::live(definition, flags)?);
        }
        Ok(Self { sets })
    }

    pub fn dry_run_for_project(project: &Project) -> Self {
        let sets = project
            .environment_names()
            .into_iter()
            .map(|name| (name, ClientSet::dry_run()))
            .collect();
        Self { sets }
    }

    pub fn get(&self, environment: &str) -> Option<&ClientSet> {
        self.sets.get(environment)
    }
}
