use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::ClassicApi;
use crate::client::{
    AutomationClient, BucketClient, ClassicClient, ClientSet, DocumentClient, DocumentPayload,
    OpenPipelineClient, RemoteEntity, SettingsClient, SettingsObject, SettingsUpsertOptions,
};
use crate::error::Result;
use crate::model::{AutomationResource, DocumentKind};

/// Dry-run client set: every upsert succeeds with a synthetic id derived
/// from its inputs, nothing is persisted, and no HTTP leaves the process.
pub fn build_client_set() -> ClientSet {
    ClientSet {
        settings: Arc::new(DryRunClient),
        classic: Arc::new(DryRunClient),
        document: Arc::new(DryRunClient),
        bucket: Arc::new(DryRunClient),
        automation: Arc::new(DryRunClient),
        open_pipeline: Arc::new(DryRunClient),
    }
}

struct DryRunClient;

fn synthetic_id(key: &str) -> String {
    format!("dryrun-{key}")
}

#[async_trait]
impl SettingsClient for DryRunClient {
    async fn upsert(
        &self,
        object: &SettingsObject,
        _options: &SettingsUpsertOptions,
    ) -> Result<RemoteEntity> {
        let id = object
            .origin_object_id
            .clone()
            .unwrap_or_else(|| synthetic_id(&object.external_id));
        Ok(RemoteEntity {
            id,
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
impl ClassicClient for DryRunClient {
    async fn list(&self, _api: &ClassicApi) -> Result<Vec<RemoteEntity>> {
        Ok(Vec::new())
    }

    async fn create(
        &self,
        api: &ClassicApi,
        name: &str,
        _payload: &Value,
    ) -> Result<RemoteEntity> {
        Ok(RemoteEntity {
            id: synthetic_id(&format!("{}-{name}", api.id)),
            name: name.to_string(),
        })
    }

    async fn update(
        &self,
        _api: &ClassicApi,
        id: &str,
        name: &str,
        _payload: &Value,
    ) -> Result<RemoteEntity> {
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
impl DocumentClient for DryRunClient {
    async fn update(&self, id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        Ok(RemoteEntity {
            id: id.to_string(),
            name: document.name.clone(),
        })
    }

    async fn create(&self, external_id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        Ok(RemoteEntity {
            id: synthetic_id(external_id),
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
impl BucketClient for DryRunClient {
    async fn upsert(&self, bucket_name: &str, _payload: &Value) -> Result<RemoteEntity> {
        Ok(RemoteEntity {
            id: bucket_name.to_string(),
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
impl AutomationClient for DryRunClient {
    async fn upsert(
        &self,
        _resource: AutomationResource,
        id: &str,
        payload: &Value,
    ) -> Result<RemoteEntity> {
        let name = payload
            .get("title")
            .or_else(|| payload.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        Ok(RemoteEntity {
            id: id.to_string(),
            name,
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
impl OpenPipelineClient for DryRunClient {
    async fn upsert(&self, kind: &str, _payload: &Value) -> Result<RemoteEntity> {
        Ok(RemoteEntity {
            id: kind.to_string(),
            name: kind.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_upsert_prefers_origin_object_id() {
        let client = DryRunClient;
        let object = SettingsObject {
            name: "Disk alerts".to_string(),
            schema_id: "builtin:alerting.profile".to_string(),
            schema_version: "1.0".to_string(),
            scope: "environment".to_string(),
            content: serde_json::json!({}),
            origin_object_id: Some("obj-1".to_string()),
            external_id: "opsgrid-abc".to_string(),
        };
        let entity = SettingsClient::upsert(&client, &object, &SettingsUpsertOptions::default())
            .await
            .expect("dry-run upsert succeeds");
        assert_eq!(entity.id, "obj-1");
    }

    #[tokio::test]
    async fn settings_upsert_synthesizes_id_from_external_id() {
        let client = DryRunClient;
        let object = SettingsObject {
            name: "Disk alerts".to_string(),
            schema_id: "builtin:alerting.profile".to_string(),
            schema_version: "1.0".to_string(),
            scope: "environment".to_string(),
            content: serde_json::json!({}),
            origin_object_id: None,
            external_id: "opsgrid-abc".to_string(),
        };
        let entity = SettingsClient::upsert(&client, &object, &SettingsUpsertOptions::default())
            .await
            .expect("dry-run upsert succeeds");
        assert_eq!(entity.id, "dryrun-opsgrid-abc");
    }
}
