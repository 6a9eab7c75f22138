use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use indexmap::IndexMap;
use serde_json::Value;

use crate::api::API_WEB_APPLICATION;
use crate::client::{SettingsObject, SettingsUpsertOptions};
use crate::entity::ResolvedEntity;
use crate::error::Result;
use crate::handlers::{DeployContext, entity_name};
use crate::model::Config;
use crate::resolve;
use crate::retry::{LONG_RETRY, VERY_LONG_RETRY};

pub const MANAGEMENT_ZONE_SCHEMA: &str = "builtin:management-zones";

pub async fn deploy(
    ctx: &DeployContext<'_>,
    config: &Config,
    schema_id: &str,
    schema_version: &str,
    scope: &str,
    properties: &IndexMap<String, Value>,
    rendered: &str,
) -> Result<ResolvedEntity> {
    let content: Value = serde_json::from_str(rendered)?;
    let name = entity_name(config, properties);

    // Referenced buckets and web applications take a while to become valid
    // settings scopes; widen the retry budget accordingly.
    let retry_setting = if config.references_type("bucket") {
        Some(LONG_RETRY)
    } else if config.references_type(API_WEB_APPLICATION) {
        Some(VERY_LONG_RETRY)
    } else {
        None
    };

    let object = SettingsObject {
        name: name.clone(),
        schema_id: schema_id.to_string(),
        schema_version: schema_version.to_string(),
        scope: resolve::render_template(scope, properties),
        content,
        origin_object_id: config.origin_object_id.clone(),
        external_id: config.coordinate.external_id(),
    };
    let options = SettingsUpsertOptions {
        retry_setting,
        insert_position: resolve::insert_position(properties),
    };

    let remote = ctx.clients.settings.upsert(&object, &options).await?;

    let mut id = remote.id;
    if schema_id == MANAGEMENT_ZONE_SCHEMA && ctx.flags.mz_numeric_ids {
        if let Some(numeric) = management_zone_numeric_id(&id) {
            id = numeric.to_string();
        }
    }

    Ok(ResolvedEntity::new(config.coordinate.clone(), name, id))
}

/// Legacy numeric id of a management zone, derived from the settings object
/// id: the objectId blob carries the numeric id in its trailing eight bytes.
pub(crate) fn management_zone_numeric_id(object_id: &str) -> Option<u64> {
    let trimmed = object_id.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let tail: [u8; 8] = bytes[bytes.len() - 8..].try_into().ok()?;
    Some(i64::from_be_bytes(tail).unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_reads_trailing_bytes() {
        let mut blob = b"vu9U3hXa".to_vec();
        blob.extend_from_slice(&42i64.to_be_bytes());
        let object_id = URL_SAFE_NO_PAD.encode(&blob);
        assert_eq!(management_zone_numeric_id(&object_id), Some(42));
    }

    #[test]
    fn numeric_id_rejects_short_blobs() {
        let object_id = URL_SAFE_NO_PAD.encode(b"tiny");
        assert_eq!(management_zone_numeric_id(&object_id), None);
    }

    #[test]
    fn numeric_id_rejects_garbage() {
        assert_eq!(management_zone_numeric_id("%%%not-base64%%%"), None);
    }
}
