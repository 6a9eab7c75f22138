use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::api::ClassicApi;
use crate::client::{
    AutomationClient, BucketClient, ClassicClient, ClientSet, DocumentClient, DocumentPayload,
    OpenPipelineClient, RemoteEntity, SettingsClient, SettingsObject, SettingsUpsertOptions,
};
use crate::config::FeatureFlags;
use crate::error::{DeployerError, Result};
use crate::model::{AutomationResource, DocumentKind, EnvironmentDefinition};
use crate::resolve::InsertPosition;
use crate::rest::RestClient;

const SETTINGS_OBJECTS_PATH: &str = "api/v2/settings/objects";
const DOCUMENTS_PATH: &str = "platform/document/v1/documents";
const BUCKETS_PATH: &str = "platform/storage/management/v1/bucket-definitions";
const OPEN_PIPELINE_PATH: &str = "platform/openpipeline/v1/configurations";

pub fn build_client_set(
    environment: &EnvironmentDefinition,
    flags: &FeatureFlags,
) -> Result<ClientSet> {
    let auth = environment.auth.resolve(&environment.name)?;
    let platform = Arc::new(RestClient::new(
        &ensure_trailing_slash(&environment.url),
        auth.clone(),
        flags.insecure_skip_verify,
    )?);
    let classic_url = classic_base_url(environment, flags);
    let classic = if classic_url == environment.url {
        platform.clone()
    } else {
        Arc::new(RestClient::new(
            &ensure_trailing_slash(&classic_url),
            auth,
            flags.insecure_skip_verify,
        )?)
    };

    Ok(ClientSet {
        settings: Arc::new(HttpSettingsClient {
            rest: platform.clone(),
        }),
        classic: Arc::new(HttpClassicClient { rest: classic }),
        document: Arc::new(HttpDocumentClient {
            rest: platform.clone(),
        }),
        bucket: Arc::new(HttpBucketClient {
            rest: platform.clone(),
        }),
        automation: Arc::new(HttpAutomationClient {
            rest: platform.clone(),
        }),
        open_pipeline: Arc::new(HttpOpenPipelineClient { rest: platform }),
    })
}

/// Classic API base URL for an environment. With the simple-URL feature the
/// platform host is rewritten instead of queried for its classic twin.
fn classic_base_url(environment: &EnvironmentDefinition, flags: &FeatureFlags) -> String {
    if let Some(url) = &environment.classic_url {
        return url.clone();
    }
    if flags.simple_classic_url && environment.url.contains(".apps.") {
        return environment.url.replace(".apps.", ".live.");
    }
    environment.url.clone()
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

struct HttpSettingsClient {
    rest: Arc<RestClient>,
}

#[async_trait]
impl SettingsClient for HttpSettingsClient {
    async fn upsert(
        &self,
        object: &SettingsObject,
        options: &SettingsUpsertOptions,
    ) -> Result<RemoteEntity> {
        // A known origin object is targeted directly; everything else goes
        // through the externalId-correlated batch upsert.
        if let Some(origin) = &object.origin_object_id {
            let body = json!({
                "schemaVersion": object.schema_version,
                "value": object.content,
            });
            let path = format!("{SETTINGS_OBJECTS_PATH}/{origin}");
            let response = match options.retry_setting {
                Some(setting) => self.rest.put_with_retry(&path, &[], &body, setting).await?,
                None => self.rest.put(&path, &[], &body).await?,
            };
            debug!(object_id = %origin, status = response.status, "settings object updated");
            return Ok(RemoteEntity {
                id: origin.clone(),
                name: object.name.clone(),
            });
        }

        let mut item = Map::new();
        item.insert("schemaId".to_string(), json!(object.schema_id));
        item.insert("schemaVersion".to_string(), json!(object.schema_version));
        item.insert("scope".to_string(), json!(object.scope));
        item.insert("externalId".to_string(), json!(object.external_id));
        item.insert("value".to_string(), object.content.clone());
        match &options.insert_position {
            // An empty predecessor id means the very front of the ordered list.
            Some(InsertPosition::Front) => {
                item.insert("insertAfter".to_string(), json!(""));
            }
            Some(InsertPosition::After(predecessor)) => {
                item.insert("insertAfter".to_string(), json!(predecessor));
            }
            Some(InsertPosition::Back) | None => {}
        }
        let body = Value::Array(vec![Value::Object(item)]);

        let response = match options.retry_setting {
            Some(setting) => {
                self.rest
                    .post_with_retry(SETTINGS_OBJECTS_PATH, &[], &body, setting)
                    .await?
            }
            None => self.rest.post(SETTINGS_OBJECTS_PATH, &[], &body).await?,
        };

        let results: Vec<Value> = response.json()?;
        let object_id = results
            .first()
            .and_then(|entry| entry.get("objectId"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployerError::Other(format!(
                    "settings upsert response carried no objectId: {}",
                    response.body
                ))
            })?;
        Ok(RemoteEntity {
            id: object_id.to_string(),
            name: object.name.clone(),
        })
    }

    async fn list(&self, schema_id: &str) -> Result<Vec<Value>> {
        self.rest
            .get_paginated(
                SETTINGS_OBJECTS_PATH,
                &[
                    ("schemaIds", schema_id.to_string()),
                    ("fields", "objectId,externalId,scope".to_string()),
                ],
                "items",
            )
            .await
    }

    async fn delete(&self, object_id: &str) -> Result<()> {
        self.rest
            .delete(&format!("{SETTINGS_OBJECTS_PATH}/{object_id}"))
            .await?;
        Ok(())
    }
}

struct HttpClassicClient {
    rest: Arc<RestClient>,
}

#[async_trait]
impl ClassicClient for HttpClassicClient {
    async fn list(&self, api: &ClassicApi) -> Result<Vec<RemoteEntity>> {
        let response = self.rest.get(api.path, &[]).await?;
        let listing: Value = response.json()?;
        let entries = listing
            .get(api.collection_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id").and_then(Value::as_str)?;
                let name = entry
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Some(RemoteEntity {
                    id: id.to_string(),
                    name: name.to_string(),
                })
            })
            .collect())
    }

    async fn create(&self, api: &ClassicApi, name: &str, payload: &Value) -> Result<RemoteEntity> {
        let response = if api.multipart {
            let bytes = serde_json::to_vec(payload)?;
            let file_name = format!("{name}.zip");
            self.rest
                .post_multipart(api.path, "file", &file_name, bytes)
                .await?
        } else {
            let query: Vec<(&str, String)> = if api.prepend_position_param {
                vec![("position", "PREPEND".to_string())]
            } else {
                Vec::new()
            };
            self.rest.post(api.path, &query, payload).await?
        };
        let created: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_string();
        Ok(RemoteEntity {
            id,
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
        let mut payload = payload.clone();
        if let Value::Object(map) = &mut payload {
            for field in api.strip_on_update {
                map.remove(*field);
            }
            if api.inject_id_into_payload {
                map.insert("id".to_string(), json!(id));
            }
        }

        let path = if api.single_configuration {
            api.path.to_string()
        } else {
            format!("{}/{}", api.path, id)
        };
        self.rest.put(&path, &[], &payload).await?;
        Ok(RemoteEntity {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    async fn delete(&self, api: &ClassicApi, id: &str) -> Result<()> {
        self.rest.delete(&format!("{}/{}", api.path, id)).await?;
        Ok(())
    }
}

struct HttpDocumentClient {
    rest: Arc<RestClient>,
}

#[async_trait]
impl DocumentClient for HttpDocumentClient {
    async fn update(&self, id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        let body = json!({
            "name": document.name,
            "type": document.kind.as_str(),
            "content": document.content,
        });
        let response = self
            .rest
            .put(&format!("{DOCUMENTS_PATH}/{id}"), &[], &body)
            .await?;
        let updated: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let remote_id = updated
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        Ok(RemoteEntity {
            id: remote_id,
            name: document.name.clone(),
        })
    }

    async fn create(&self, external_id: &str, document: &DocumentPayload) -> Result<RemoteEntity> {
        let body = json!({
            "externalId": external_id,
            "name": document.name,
            "type": document.kind.as_str(),
            "content": document.content,
        });
        let response = self.rest.post(DOCUMENTS_PATH, &[], &body).await?;
        let created: Value = response.json()?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DeployerError::Other(format!(
                    "document create response carried no id: {}",
                    response.body
                ))
            })?
            .to_string();
        Ok(RemoteEntity {
            id,
            name: document.name.clone(),
        })
    }

    async fn list(&self, kind: DocumentKind) -> Result<Vec<Value>> {
        self.rest
            .get_paginated(
                DOCUMENTS_PATH,
                &[("filter", format!("type=='{}'", kind.as_str()))],
                "documents",
            )
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.rest.delete(&format!("{DOCUMENTS_PATH}/{id}")).await?;
        Ok(())
    }
}

struct HttpBucketClient {
    rest: Arc<RestClient>,
}

#[async_trait]
impl BucketClient for HttpBucketClient {
    async fn upsert(&self, bucket_name: &str, payload: &Value) -> Result<RemoteEntity> {
        let path = format!("{BUCKETS_PATH}/{bucket_name}");
        match self.rest.put(&path, &[], payload).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                self.rest.post(BUCKETS_PATH, &[], payload).await?;
            }
            Err(err) => return Err(err),
        }
        Ok(RemoteEntity {
            id: bucket_name.to_string(),
            name: bucket_name.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        self.rest.get_paginated(BUCKETS_PATH, &[], "buckets").await
    }

    async fn delete(&self, bucket_name: &str) -> Result<()> {
        self.rest
            .delete(&format!("{BUCKETS_PATH}/{bucket_name}"))
            .await?;
        Ok(())
    }
}

struct HttpAutomationClient {
    rest: Arc<RestClient>,
}

fn automation_path(resource: AutomationResource) -> &'static str {
    match resource {
        AutomationResource::Workflow => "platform/automation/v1/workflows",
        AutomationResource::BusinessCalendar => "platform/automation/v1/business-calendars",
        AutomationResource::SchedulingRule => "platform/automation/v1/scheduling-rules",
    }
}

#[async_trait]
impl AutomationClient for HttpAutomationClient {
    async fn upsert(
        &self,
        resource: AutomationResource,
        id: &str,
        payload: &Value,
    ) -> Result<RemoteEntity> {
        let base = automation_path(resource);
        let path = format!("{base}/{id}");
        let name = payload
            .get("title")
            .or_else(|| payload.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        match self.rest.put(&path, &[], payload).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                let mut body = payload.clone();
                if let Value::Object(map) = &mut body {
                    map.insert("id".to_string(), json!(id));
                }
                self.rest.post(base, &[], &body).await?;
            }
            Err(err) => return Err(err),
        }
        Ok(RemoteEntity {
            id: id.to_string(),
            name,
        })
    }

    async fn list(&self, resource: AutomationResource) -> Result<Vec<Value>> {
        self.rest
            .get_paginated(automation_path(resource), &[], "results")
            .await
    }

    async fn delete(&self, resource: AutomationResource, id: &str) -> Result<()> {
        self.rest
            .delete(&format!("{}/{}", automation_path(resource), id))
            .await?;
        Ok(())
    }
}

struct HttpOpenPipelineClient {
    rest: Arc<RestClient>,
}

#[async_trait]
impl OpenPipelineClient for HttpOpenPipelineClient {
    async fn upsert(&self, kind: &str, payload: &Value) -> Result<RemoteEntity> {
        self.rest
            .put(&format!("{OPEN_PIPELINE_PATH}/{kind}"), &[], payload)
            .await?;
        Ok(RemoteEntity {
            id: kind.to_string(),
            name: kind.to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<Value>> {
        let response = self.rest.get(OPEN_PIPELINE_PATH, &[]).await?;
        let listing: Value = response.json()?;
        Ok(listing
            .get("configurations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthSpec;

    fn environment(url: &str, classic_url: Option<&str>) -> EnvironmentDefinition {
        EnvironmentDefinition {
            name: "staging".to_string(),
            url: url.to_string(),
            classic_url: classic_url.map(str::to_string),
            auth: AuthSpec::Token {
                token_var: "STAGING_TOKEN".to_string(),
            },
        }
    }

    #[test]
    fn explicit_classic_url_wins() {
        let env = environment(
            "https://abc.apps.opsgrid.io",
            Some("https://classic.example.com"),
        );
        let flags = FeatureFlags {
            simple_classic_url: true,
            ..FeatureFlags::default()
        };
        assert_eq!(classic_base_url(&env, &flags), "https://classic.example.com");
    }

    #[test]
    fn simple_classic_url_rewrites_apps_host() {
        let env = environment("https://abc.apps.opsgrid.io", None);
        let flags = FeatureFlags {
            simple_classic_url: true,
            ..FeatureFlags::default()
        };
        assert_eq!(
            classic_base_url(&env, &flags),
            "https://abc.live.opsgrid.io"
        );
    }

    #[test]
    fn classic_url_falls_back_to_platform_url() {
        let env = environment("https://abc.apps.opsgrid.io", None);
        let flags = FeatureFlags::default();
        assert_eq!(
            classic_base_url(&env, &flags),
            "https://abc.apps.opsgrid.io"
        );
    }
}
