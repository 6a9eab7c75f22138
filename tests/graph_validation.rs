use std::fs;

use serde_json::json;
use tempfile::tempdir;

use opsgrid_deployer::deploy;
use opsgrid_deployer::error::DeployerError;
use opsgrid_deployer::model::Project;

fn manifest_with_configs(configs: serde_json::Value) -> serde_json::Value {
    json!({
        "environments": [
            {
                "name": "staging",
                "url": "https://test.apps.opsgrid.io",
                "auth": {"type": "token", "tokenVar": "TEST_TOKEN"}
            }
        ],
        "configs": configs
    })
}

fn bucket_entry(id: &str, references: &[&str]) -> serde_json::Value {
    let parameters: serde_json::Map<String, serde_json::Value> = references
        .iter()
        .enumerate()
        .map(|(i, reference)| {
            (
                format!("dep{i}"),
                json!({
                    "type": "reference",
                    "coordinate": {
                        "project": "infra",
                        "type": "bucket",
                        "configId": reference
                    },
                    "property": "id"
                }),
            )
        })
        .collect();
    json!({
        "project": "infra",
        "configId": id,
        "kind": "bucket",
        "environment": "staging",
        "template": "{}",
        "parameters": parameters
    })
}

fn load_project(manifest: serde_json::Value) -> Result<Project, DeployerError> {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("manifest.json");
    fs::write(&path, serde_json::to_vec_pretty(&manifest).expect("serializes")).expect("written");
    Project::from_manifest_file(&path)
}

#[test]
fn valid_manifest_round_trips_and_validates() {
    let manifest = manifest_with_configs(json!([
        bucket_entry("a", &[]),
        bucket_entry("b", &["a"]),
    ]));
    let project = load_project(manifest).expect("manifest loads");
    assert_eq!(project.configs.len(), 2);
    deploy::validate(&project).expect("acyclic project validates");
}

#[test]
fn cycles_fail_validation_listing_both_members() {
    let manifest = manifest_with_configs(json!([
        bucket_entry("a", &["b"]),
        bucket_entry("b", &["a"]),
    ]));
    let project = load_project(manifest).expect("manifest loads");
    let err = deploy::validate(&project).expect_err("cycle rejected");
    match err {
        DeployerError::CircularDependency { members } => {
            let ids: Vec<&str> = members.iter().map(|c| c.config_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("expected circular dependency, got {other}"),
    }
}

#[test]
fn unknown_references_fail_validation() {
    let manifest = manifest_with_configs(json!([bucket_entry("a", &["ghost"])]));
    let project = load_project(manifest).expect("manifest loads");
    let err = deploy::validate(&project).expect_err("unknown reference rejected");
    assert!(matches!(err, DeployerError::UnknownReference { .. }));
}

#[test]
fn undefined_environment_is_a_manifest_error() {
    let manifest = json!({
        "environments": [],
        "configs": [bucket_entry("a", &[])]
    });
    let err = load_project(manifest).expect_err("environment missing");
    assert!(matches!(err, DeployerError::Manifest(_)));
}
