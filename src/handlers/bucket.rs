use indexmap::IndexMap;
use serde_json::Value;

use crate::entity::ResolvedEntity;
use crate::error::Result;
use crate::handlers::{DeployContext, entity_name};
use crate::model::Config;

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    properties: &IndexMap<String, Value>,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let payload: Value = serde_json::from_str(rendered)?;
    let name = entity_name(config, properties);
    let bucket_name = payload
        .get("bucketName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| name.clone());

    let remote = ctx.clients.bucket.upsert(&bucket_name, &payload).await?;
    Ok(ResolvedEntity::new(
        config.coordinate.clone(),
        name,
        remote.id,
    ))
}
