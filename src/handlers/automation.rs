use crate::entity::ResolvedEntity;
use crate::error::Result;
use crate::handlers::DeployContext;
use crate::model::{AutomationResource, Config};
use serde_json::Value;

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    resource: AutomationResource,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let payload: Value = serde_json::from_str(rendered)?;
    // Automation objects are keyed by the coordinate-derived external id.
    let id = config.coordinate.external_id();
    let remote = ctx.clients.automation.upsert(resource, &id, &payload).await?;
    Ok(ResolvedEntity::new(
        config.coordinate.clone(),
        remote.name,
        remote.id,
    ))
}
