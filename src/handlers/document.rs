use indexmap::IndexMap;
use serde_json::Value;

use crate::client::DocumentPayload;
use crate::entity::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::handlers::{DeployContext, entity_name};
use crate::model::{Config, DocumentKind};

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    kind: DocumentKind,
    properties: &IndexMap<String, Value>,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let content: Value = serde_json::from_str(rendered)?;
    reject_classic_dashboard(config, kind, &content)?;

    let name = entity_name(config, properties);
    let document = DocumentPayload {
        kind,
        name: name.clone(),
        content,
    };
    let external_id = config.coordinate.external_id();
    let client = &ctx.clients.document;

    // Update-then-create: a known origin object first, the external-id
    // correlation second, creation only when neither exists remotely.
    if let Some(origin) = &config.origin_object_id {
        match client.update(origin, &document).await {
            Ok(remote) => {
                return Ok(ResolvedEntity::new(
                    config.coordinate.clone(),
                    name,
                    remote.id,
                ));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
    }

    let remote = match client.update(&external_id, &document).await {
        Ok(remote) => remote,
        Err(err) if err.is_not_found() => client.create(&external_id, &document).await?,
        Err(err) => return Err(err),
    };

    Ok(ResolvedEntity::new(
        config.coordinate.clone(),
        name,
        remote.id,
    ))
}

/// A dashboard payload with a `tiles` array is the classic dashboard schema;
/// the documents API would accept and then mangle it, so it is rejected
/// before any call goes out.
fn reject_classic_dashboard(config: &Config, kind: DocumentKind, content: &Value) -> Result<()> {
    if kind == DocumentKind::Dashboard
        && content
            .get("tiles")
            .map(Value::is_array)
            .unwrap_or(false)
    {
        return Err(DeployerError::WrongPayloadType {
            coordinate: config.coordinate.clone(),
        });
    }
    Ok(())
}
