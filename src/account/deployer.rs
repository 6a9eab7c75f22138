use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::account::client::{AccountClient, PermissionRecord, RemoteGroup, RemotePolicy};
use crate::account::dispatcher::Dispatcher;
use crate::account::types::{AccountInfo, AccountResources, Group, Policy, PolicyLevel, Ref};
use crate::config::FeatureFlags;
use crate::error::{DeployerError, Result};

/// Remote owners whose groups are provisioned outside this tool.
const READ_ONLY_OWNERS: &[&str] = &["SCIM", "ALL_USERS"];

/// Shared lookup from local names/ids to remote UUIDs, one mutex per
/// sub-table. Phase 1 seeds the remote names, phase 2 adds the local ids.
#[derive(Default)]
struct IdMap {
    policies: Mutex<HashMap<String, String>>,
    groups: Mutex<HashMap<String, String>>,
    management_zones: Mutex<HashMap<(String, String), String>>,
}

#[derive(Default)]
struct DeployState {
    ids: IdMap,
    remote_policies: Mutex<Vec<RemotePolicy>>,
    remote_groups: Mutex<Vec<RemoteGroup>>,
}

/// Deploy one account bundle: fetch existing state, upsert the principals,
/// then rewrite the bindings. Each phase is a barrier for the next.
pub async fn deploy(
    resources: &AccountResources,
    client: Arc<dyn AccountClient>,
    max_concurrent: usize,
    flags: &FeatureFlags,
) -> Result<()> {
    let state = Arc::new(DeployState::default());
    let account = resources.account.clone();
    info!(
        account = %account.name,
        policies = resources.policies.len(),
        groups = resources.groups.len(),
        users = resources.users.len(),
        "deploying account resources"
    );

    fetch_existing_state(&client, &state, max_concurrent).await?;
    upsert_principals(resources, &account, &client, &state, max_concurrent, flags).await?;
    update_bindings(resources, &account, &client, &state, max_concurrent).await?;

    Ok(())
}

/// Phase 1: concurrent fetches of policies, groups, and management zones.
/// Any failure aborts the run.
async fn fetch_existing_state(
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
    max_concurrent: usize,
) -> Result<()> {
    let mut dispatcher = Dispatcher::new(max_concurrent, 8);
    dispatcher.run();

    {
        let client = client.clone();
        let state = state.clone();
        dispatcher
            .add_job(Box::pin(async move {
                let policies = client.get_policies().await?;
                {
                    let mut table = state
                        .ids
                        .policies
                        .lock()
                        .expect("policy id table lock poisoned");
                    for policy in &policies {
                        table.insert(policy.name.clone(), policy.uuid.clone());
                    }
                }
                *state
                    .remote_policies
                    .lock()
                    .expect("remote policy list lock poisoned") = policies;
                Ok(())
            }))
            .await?;
    }
    {
        let client = client.clone();
        let state = state.clone();
        dispatcher
            .add_job(Box::pin(async move {
                let groups = client.get_groups().await?;
                {
                    let mut table = state
                        .ids
                        .groups
                        .lock()
                        .expect("group id table lock poisoned");
                    for group in &groups {
                        table.insert(group.name.clone(), group.uuid.clone());
                    }
                }
                *state
                    .remote_groups
                    .lock()
                    .expect("remote group list lock poisoned") = groups;
                Ok(())
            }))
            .await?;
    }
    {
        let client = client.clone();
        let state = state.clone();
        dispatcher
            .add_job(Box::pin(async move {
                let zones = client.get_management_zones().await?;
                let mut table = state
                    .ids
                    .management_zones
                    .lock()
                    .expect("management zone table lock poisoned");
                for zone in zones {
                    table.insert((zone.environment, zone.name), zone.id);
                }
                Ok(())
            }))
            .await?;
    }

    dispatcher.stop_first_error().await
}

/// Phase 2: upsert every policy, group, and user with bounded concurrency.
async fn upsert_principals(
    resources: &AccountResources,
    account: &AccountInfo,
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
    max_concurrent: usize,
    flags: &FeatureFlags,
) -> Result<()> {
    let job_count =
        resources.policies.len() + resources.groups.len() + resources.users.len();
    let mut dispatcher = Dispatcher::new(max_concurrent, job_count.max(1));
    dispatcher.run();

    for (local_id, policy) in &resources.policies {
        let account = account.clone();
        let client = client.clone();
        let state = state.clone();
        let local_id = local_id.clone();
        let policy = policy.clone();
        dispatcher
            .add_job(Box::pin(async move {
                upsert_policy(&account, &local_id, &policy, &client, &state).await
            }))
            .await?;
    }

    for (local_id, group) in &resources.groups {
        let client = client.clone();
        let state = state.clone();
        let local_id = local_id.clone();
        let group = group.clone();
        let skip_readonly = flags.skip_readonly_group_updates;
        dispatcher
            .add_job(Box::pin(async move {
                upsert_group(&local_id, &group, &client, &state, skip_readonly).await
            }))
            .await?;
    }

    for user in resources.users.values() {
        let client = client.clone();
        let email = user.email.clone();
        dispatcher
            .add_job(Box::pin(async move {
                if client.get_user(&email).await?.is_none() {
                    client.create_user(&email).await?;
                }
                Ok(())
            }))
            .await?;
    }

    reduce_errors(dispatcher.stop().await)
}

async fn upsert_policy(
    account: &AccountInfo,
    local_id: &str,
    policy: &Policy,
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
) -> Result<()> {
    let (level_type, level_id) = match &policy.level {
        PolicyLevel::Account => ("account", account.account_uuid.clone()),
        PolicyLevel::Environment { environment } => ("environment", environment.clone()),
    };

    let uuid = if let Some(origin) = &policy.origin_object_id {
        client
            .update_policy(level_type, &level_id, origin, policy)
            .await?;
        origin.clone()
    } else {
        let candidates: Vec<RemotePolicy> = {
            let remote = state
                .remote_policies
                .lock()
                .expect("remote policy list lock poisoned");
            remote
                .iter()
                .filter(|existing| {
                    existing.name == policy.name
                        && existing.level_type == level_type
                        && existing.level_id == level_id
                })
                .cloned()
                .collect()
        };
        match candidates.as_slice() {
            [] => {
                client
                    .create_policy(level_type, &level_id, policy)
                    .await?
                    .uuid
            }
            [only] => {
                client
                    .update_policy(level_type, &level_id, &only.uuid, policy)
                    .await?;
                only.uuid.clone()
            }
            many => {
                warn!(
                    policy = %policy.name,
                    candidates = many.len(),
                    chosen = %many[0].uuid,
                    "multiple remote policies share this name; updating one of them"
                );
                client
                    .update_policy(level_type, &level_id, &many[0].uuid, policy)
                    .await?;
                many[0].uuid.clone()
            }
        }
    };

    let mut table = state
        .ids
        .policies
        .lock()
        .expect("policy id table lock poisoned");
    table.insert(local_id.to_string(), uuid.clone());
    table.insert(policy.name.clone(), uuid);
    Ok(())
}

async fn upsert_group(
    local_id: &str,
    group: &Group,
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
    skip_readonly: bool,
) -> Result<()> {
    let candidates: Vec<RemoteGroup> = {
        let remote = state
            .remote_groups
            .lock()
            .expect("remote group list lock poisoned");
        remote
            .iter()
            .filter(|existing| existing.name == group.name)
            .cloned()
            .collect()
    };

    // Groups provisioned by SCIM or ALL_USERS are never mutated when the
    // feature flag is on; their uuid is still recorded for binding.
    if skip_readonly
        && let Some(readonly) = candidates.iter().find(|existing| {
            existing
                .owner
                .as_deref()
                .map(|owner| READ_ONLY_OWNERS.contains(&owner))
                .unwrap_or(false)
        })
    {
        info!(
            group = %group.name,
            owner = readonly.owner.as_deref().unwrap_or_default(),
            "leaving externally-owned group untouched"
        );
        record_group_uuid(state, local_id, group, readonly.uuid.clone());
        return Ok(());
    }

    let uuid = if let Some(origin) = &group.origin_object_id {
        client.update_group(origin, group).await?;
        origin.clone()
    } else {
        match candidates.as_slice() {
            [] => client.create_group(group).await?.uuid,
            [only] => {
                client.update_group(&only.uuid, group).await?;
                only.uuid.clone()
            }
            many => {
                warn!(
                    group = %group.name,
                    candidates = many.len(),
                    chosen = %many[0].uuid,
                    "multiple remote groups share this name; updating one of them"
                );
                client.update_group(&many[0].uuid, group).await?;
                many[0].uuid.clone()
            }
        }
    };

    record_group_uuid(state, local_id, group, uuid);
    Ok(())
}

fn record_group_uuid(state: &Arc<DeployState>, local_id: &str, group: &Group, uuid: String) {
    let mut table = state
        .ids
        .groups
        .lock()
        .expect("group id table lock poisoned");
    table.insert(local_id.to_string(), uuid.clone());
    table.insert(group.name.clone(), uuid);
}

/// Phase 3: rewrite policy bindings, permissions, and user memberships using
/// the now-complete id map. Resolution failures abort before any call.
async fn update_bindings(
    resources: &AccountResources,
    account: &AccountInfo,
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
    max_concurrent: usize,
) -> Result<()> {
    let job_count = resources.groups.len() + resources.users.len();
    let mut dispatcher = Dispatcher::new(max_concurrent, job_count.max(1));
    dispatcher.run();

    for (local_id, group) in &resources.groups {
        let account = account.clone();
        let client = client.clone();
        let state = state.clone();
        let local_id = local_id.clone();
        let group = group.clone();
        dispatcher
            .add_job(Box::pin(async move {
                bind_group(&account, &local_id, &group, &client, &state).await
            }))
            .await?;
    }

    for user in resources.users.values() {
        let client = client.clone();
        let state = state.clone();
        let user = user.clone();
        dispatcher
            .add_job(Box::pin(async move {
                let (uuids, unresolved) = {
                    let table = state
                        .ids
                        .groups
                        .lock()
                        .expect("group id table lock poisoned");
                    resolve_refs(&user.groups, &table)
                };
                if !unresolved.is_empty() {
                    return Err(DeployerError::UnknownAccountReferences { ids: unresolved });
                }
                client.update_user_groups(&user.email, &uuids).await
            }))
            .await?;
    }

    reduce_errors(dispatcher.stop().await)
}

async fn bind_group(
    account: &AccountInfo,
    local_id: &str,
    group: &Group,
    client: &Arc<dyn AccountClient>,
    state: &Arc<DeployState>,
) -> Result<()> {
    // Resolve everything up front; a single unknown reference aborts the
    // whole binding operation for this group.
    let mut unresolved = Vec::new();

    let group_uuid = {
        let table = state
            .ids
            .groups
            .lock()
            .expect("group id table lock poisoned");
        table.get(local_id).cloned()
    };
    let Some(group_uuid) = group_uuid else {
        return Err(DeployerError::UnknownAccountReferences {
            ids: vec![local_id.to_string()],
        });
    };

    let policy_table = state
        .ids
        .policies
        .lock()
        .expect("policy id table lock poisoned")
        .clone();

    let account_policy_uuids = group
        .account
        .as_ref()
        .map(|bindings| {
            let (uuids, missing) = resolve_refs(&bindings.policies, &policy_table);
            unresolved.extend(missing);
            uuids
        })
        .unwrap_or_default();

    let mut environment_policy_uuids: Vec<(String, Vec<String>)> = Vec::new();
    for binding in &group.environments {
        let (uuids, missing) = resolve_refs(&binding.policies, &policy_table);
        unresolved.extend(missing);
        environment_policy_uuids.push((binding.environment.clone(), uuids));
    }

    let permissions = {
        let zone_table = state
            .ids
            .management_zones
            .lock()
            .expect("management zone table lock poisoned");
        permission_records(&account.account_uuid, group, &zone_table, &mut unresolved)
    };

    if !unresolved.is_empty() {
        unresolved.sort();
        unresolved.dedup();
        return Err(DeployerError::UnknownAccountReferences { ids: unresolved });
    }

    if group.account.is_some() {
        client
            .update_account_policy_bindings(&group_uuid, &account_policy_uuids)
            .await?;
    }

    if group.environments.is_empty() {
        // No declared environment bindings means none must remain remotely.
        client
            .delete_all_environment_policy_bindings(&group_uuid)
            .await?;
    } else {
        for (environment, uuids) in &environment_policy_uuids {
            client
                .update_environment_policy_bindings(environment, &group_uuid, uuids)
                .await?;
        }
    }

    client
        .update_group_permissions(&group_uuid, &permissions)
        .await
}

/// Resolve references through an id table, splitting into resolved UUIDs and
/// unresolved keys.
fn resolve_refs(refs: &[Ref], table: &HashMap<String, String>) -> (Vec<String>, Vec<String>) {
    let mut uuids = Vec::new();
    let mut unresolved = Vec::new();
    for reference in refs {
        match table.get(reference.key()) {
            Some(uuid) => uuids.push(uuid.clone()),
            None => unresolved.push(reference.key().to_string()),
        }
    }
    (uuids, unresolved)
}

/// The combined permission overwrite list of a group: account-scoped,
/// tenant-scoped, and management-zone-scoped records.
fn permission_records(
    account_uuid: &str,
    group: &Group,
    zone_table: &HashMap<(String, String), String>,
    unresolved: &mut Vec<String>,
) -> Vec<PermissionRecord> {
    let mut records = Vec::new();
    if let Some(bindings) = &group.account {
        for permission in &bindings.permissions {
            records.push(PermissionRecord {
                name: permission.clone(),
                scope: account_uuid.to_string(),
                scope_type: "account".to_string(),
            });
        }
    }
    for binding in &group.environments {
        for permission in &binding.permissions {
            records.push(PermissionRecord {
                name: permission.clone(),
                scope: binding.environment.clone(),
                scope_type: "tenant".to_string(),
            });
        }
    }
    for binding in &group.management_zones {
        let key = (
            binding.environment.clone(),
            binding.management_zone.clone(),
        );
        let Some(zone_id) = zone_table.get(&key) else {
            unresolved.push(format!("{}:{}", binding.environment, binding.management_zone));
            continue;
        };
        for permission in &binding.permissions {
            records.push(PermissionRecord {
                name: permission.clone(),
                scope: format!("{}:{}", binding.environment, zone_id),
                scope_type: "management-zone".to_string(),
            });
        }
    }
    records
}

fn reduce_errors(mut errors: Vec<DeployerError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => {
            let joined = errors
                .iter()
                .map(|err| err.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Err(DeployerError::Other(joined))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::{GroupAccountBindings, GroupManagementZoneBindings};

    #[test]
    fn resolve_refs_splits_resolved_and_unknown() {
        let mut table = HashMap::new();
        table.insert("ops".to_string(), "uuid-1".to_string());
        let refs = vec![
            Ref::Local {
                reference: "ops".to_string(),
            },
            Ref::Name("Missing policy".to_string()),
        ];
        let (uuids, unresolved) = resolve_refs(&refs, &table);
        assert_eq!(uuids, vec!["uuid-1".to_string()]);
        assert_eq!(unresolved, vec!["Missing policy".to_string()]);
    }

    #[test]
    fn permission_records_combine_all_scopes() {
        let mut zones = HashMap::new();
        zones.insert(
            ("staging".to_string(), "payments".to_string()),
            "mz-7".to_string(),
        );
        let group = Group {
            name: "ops".to_string(),
            description: None,
            account: Some(GroupAccountBindings {
                policies: Vec::new(),
                permissions: vec!["account-viewer".to_string()],
            }),
            environments: vec![crate::account::types::GroupEnvironmentBindings {
                environment: "staging".to_string(),
                policies: Vec::new(),
                permissions: vec!["tenant-viewer".to_string()],
            }],
            management_zones: vec![GroupManagementZoneBindings {
                environment: "staging".to_string(),
                management_zone: "payments".to_string(),
                permissions: vec!["tenant-viewer".to_string()],
            }],
            origin_object_id: None,
        };
        let mut unresolved = Vec::new();
        let records = permission_records("acc-1", &group, &zones, &mut unresolved);
        assert!(unresolved.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].scope_type, "account");
        assert_eq!(records[0].scope, "acc-1");
        assert_eq!(records[1].scope_type, "tenant");
        assert_eq!(records[1].scope, "staging");
        assert_eq!(records[2].scope_type, "management-zone");
        assert_eq!(records[2].scope, "staging:mz-7");
    }

    #[test]
    fn unknown_management_zone_is_reported() {
        let zones = HashMap::new();
        let group = Group {
            name: "ops".to_string(),
            description: None,
            account: None,
            environments: Vec::new(),
            management_zones: vec![GroupManagementZoneBindings {
                environment: "staging".to_string(),
                management_zone: "ghost".to_string(),
                permissions: vec!["tenant-viewer".to_string()],
            }],
            origin_object_id: None,
        };
        let mut unresolved = Vec::new();
        let records = permission_records("acc-1", &group, &zones, &mut unresolved);
        assert!(records.is_empty());
        assert_eq!(unresolved, vec!["staging:ghost".to_string()]);
    }

    #[test]
    fn reduce_errors_passes_single_error_through() {
        assert!(reduce_errors(Vec::new()).is_ok());
        let err = reduce_errors(vec![DeployerError::UnknownAccountReferences {
            ids: vec!["Q".to_string()],
        }])
        .expect_err("single error");
        assert!(matches!(err, DeployerError::UnknownAccountReferences { .. }));
    }
}
