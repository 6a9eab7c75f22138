use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;

use crate::api::API_EXTENSION;
use crate::client::ClientSet;
use crate::config::FeatureFlags;
use crate::entity::{EntityMap, ResolvedEntity};
use crate::error::Result;
use crate::model::{Config, ConfigType};
use crate::resolve;

pub mod automation;
pub mod bucket;
pub mod classic;
pub mod document;
pub mod open_pipeline;
pub mod settings;

/// Everything a handler needs besides the config itself.
pub struct DeployContext<'a> {
    pub clients: &'a ClientSet,
    pub entities: &'a EntityMap,
    pub flags: &'a FeatureFlags,
}

/// Resolve, render, and upsert one configuration, returning the entity to
/// publish. Dispatches on the config's type tag.
pub async fn deploy_config(ctx: &DeployContext<'_>, config: &Config) -> Result<ResolvedEntity> {
    let properties = resolve::resolve_parameters(config, ctx.entities)?;
    let rendered = resolve::render_template(&config.template, &properties);

    let entity = match &config.config_type {
        ConfigType::Settings {
            schema_id,
            schema_version,
            scope,
        } => {
            settings::deploy(
                ctx,
                config,
                schema_id,
                schema_version,
                scope,
                &properties,
                &rendered,
            )
            .await?
        }
        ConfigType::Classic { api } => {
            classic::deploy(ctx, config, api, &properties, &rendered).await?
        }
        ConfigType::Document { document_kind } => {
            document::deploy(ctx, config, *document_kind, &properties, &rendered).await?
        }
        ConfigType::Bucket => bucket::deploy(ctx, config, &properties, &rendered).await?,
        ConfigType::Automation { resource } => {
            automation::deploy(ctx, config, *resource, &rendered).await?
        }
        ConfigType::OpenPipeline { pipeline_kind } => {
            open_pipeline::deploy(ctx, config, pipeline_kind, &rendered).await?
        }
    };

    Ok(entity.with_properties(properties.into_iter().collect()))
}

/// Whether a config type participates in this run at all. Disabled families
/// are excluded, not failed.
pub fn is_enabled(config_type: &ConfigType, flags: &FeatureFlags) -> bool {
    match config_type {
        ConfigType::Document { .. } => flags.documents_enabled,
        ConfigType::OpenPipeline { .. } => flags.open_pipeline_enabled,
        _ => true,
    }
}

/// Optional spacing before a node task launches, to throttle API families
/// that dislike request bursts.
pub fn deploy_wait(config_type: &ConfigType) -> Option<Duration> {
    match config_type {
        ConfigType::Classic { api } if api == API_EXTENSION => Some(Duration::from_secs(1)),
        _ => None,
    }
}

/// The display name of the deployed entity: the resolved `name` parameter,
/// falling back to the config id.
pub fn entity_name(config: &Config, properties: &IndexMap<String, Value>) -> String {
    properties
        .get("name")
        .map(resolve::value_to_string)
        .unwrap_or_else(|| config.coordinate.config_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;
    use crate::model::DocumentKind;
    use serde_json::json;

    #[test]
    fn disabled_documents_are_excluded() {
        let flags = FeatureFlags {
            documents_enabled: false,
            ..FeatureFlags::default()
        };
        assert!(!is_enabled(
            &ConfigType::Document {
                document_kind: DocumentKind::Notebook
            },
            &flags
        ));
        assert!(is_enabled(&ConfigType::Bucket, &flags));
    }

    #[test]
    fn extensions_get_a_deploy_wait() {
        let wait = deploy_wait(&ConfigType::Classic {
            api: API_EXTENSION.to_string(),
        });
        assert_eq!(wait, Some(Duration::from_secs(1)));
        assert_eq!(deploy_wait(&ConfigType::Bucket), None);
    }

    #[test]
    fn entity_name_prefers_name_property() {
        let config = Config {
            coordinate: Coordinate::new("infra", "bucket", "raw-logs"),
            config_type: ConfigType::Bucket,
            environment: "staging".to_string(),
            group: "default".to_string(),
            template: "{}".to_string(),
            parameters: IndexMap::new(),
            origin_object_id: None,
            skip: false,
        };
        let mut properties = IndexMap::new();
        assert_eq!(entity_name(&config, &properties), "raw-logs");
        properties.insert("name".to_string(), json!("Raw logs"));
        assert_eq!(entity_name(&config, &properties), "Raw logs");
    }
}
