use crate::entity::ResolvedEntity;
use crate::error::Result;
use crate::handlers::DeployContext;
use crate::model::Config;
use serde_json::Value;

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    kind: &str,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let payload: Value = serde_json::from_str(rendered)?;
    let remote = ctx.clients.open_pipeline.upsert(kind, &payload).await?;
    Ok(ResolvedEntity::new(
        config.coordinate.clone(),
        remote.name,
        remote.id,
    ))
}
