use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::api::classic_api;
use crate::client::RemoteEntity;
use crate::entity::ResolvedEntity;
use crate::error::{DeployerError, Result};
use crate::handlers::{DeployContext, entity_name};
use crate::model::Config;

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    api_id: &str,
    properties: &IndexMap<String, Value>,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let api = classic_api(api_id).ok_or_else(|| {
        DeployerError::Config(format!(
            "{}: unknown classic API '{api_id}'",
            config.coordinate
        ))
    })?;
    let payload: Value = serde_json::from_str(rendered)?;
    let name = entity_name(config, properties);
    let client = &ctx.clients.classic;

    // Single-configuration endpoints have no id and always PUT.
    if api.single_configuration {
        let remote = client.update(api, "", &name, &payload).await?;
        return Ok(ResolvedEntity::new(
            config.coordinate.clone(),
            name,
            remote.id,
        ));
    }

    let existing = client.list(api).await?;
    let matches: Vec<&RemoteEntity> = existing
        .iter()
        .filter(|entity| entity.name == name)
        .collect();

    let remote = match matches.as_slice() {
        [] => client.create(api, &name, &payload).await?,
        [only] => client.update(api, &only.id, &name, &payload).await?,
        many => {
            let chosen = select_among_duplicates(many, config.origin_object_id.as_deref());
            warn!(
                coordinate = %config.coordinate,
                api = api.id,
                name = %name,
                candidates = many.len(),
                chosen = %chosen.id,
                "multiple remote configurations share this name; updating one of them"
            );
            client.update(api, &chosen.id, &name, &payload).await?
        }
    };

    Ok(ResolvedEntity::new(
        config.coordinate.clone(),
        name,
        remote.id,
    ))
}

/// Tiebreak when several remote objects carry the target name: prefer the
/// one matching the known origin object id, otherwise take the first as the
/// server returned it.
pub(crate) fn select_among_duplicates<'a>(
    matches: &[&'a RemoteEntity],
    origin_object_id: Option<&str>,
) -> &'a RemoteEntity {
    if let Some(origin) = origin_object_id
        && let Some(found) = matches.iter().find(|entity| entity.id == origin)
    {
        return found;
    }
    matches[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, name: &str) -> RemoteEntity {
        RemoteEntity {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn tiebreak_prefers_origin_object_id() {
        let a = entity("cfg-1", "shared");
        let b = entity("cfg-2", "shared");
        let matches = vec![&a, &b];
        let chosen = select_among_duplicates(&matches, Some("cfg-2"));
        assert_eq!(chosen.id, "cfg-2");
    }

    #[test]
    fn tiebreak_falls_back_to_first_candidate() {
        let a = entity("cfg-1", "shared");
        let b = entity("cfg-2", "shared");
        let matches = vec![&a, &b];
        assert_eq!(select_among_duplicates(&matches, None).id, "cfg-1");
        assert_eq!(
            select_among_duplicates(&matches, Some("cfg-9")).id,
            "cfg-1"
        );
    }
}
