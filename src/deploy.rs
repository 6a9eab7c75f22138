use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{Instrument, info, info_span};

use crate::account::client::AccountClient;
use crate::account::deployer as account_deployer;
use crate::client::{ClientSet, EnvironmentClients};
use crate::config::FeatureFlags;
use crate::coordinate::Coordinate;
use crate::entity::{EntityMap, ResolvedEntity};
use crate::error::{DeployerError, Result};
use crate::graph::{ComponentGraph, build_component_graphs};
use crate::handlers::{self, DeployContext};
use crate::model::{Config, Project};
use crate::report;

/// Options controlling a deploy run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub concurrent_requests: usize,
}

/// One failing configuration and its error.
#[derive(Debug)]
pub struct CoordinateError {
    pub coordinate: Coordinate,
    pub error: DeployerError,
}

/// Aggregate of every hard error of a run, keyed by environment name.
/// Skipped configurations are reported but never counted here.
#[derive(Debug, Default)]
pub struct EnvironmentDeploymentErrors {
    pub environments: BTreeMap<String, Vec<CoordinateError>>,
}

impl EnvironmentDeploymentErrors {
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.environments.values().map(Vec::len).sum()
    }

    fn push(&mut self, environment: &str, error: CoordinateError) {
        self.environments
            .entry(environment.to_string())
            .or_default()
            .push(error);
    }
}

impl fmt::Display for EnvironmentDeploymentErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "deployment failed in {} environment(s):", self.environments.len())?;
        for (environment, errors) in &self.environments {
            for entry in errors {
                writeln!(
                    f,
                    "  [{environment}] {}: {}",
                    entry.coordinate, entry.error
                )?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for EnvironmentDeploymentErrors {}

/// Outcome of a single node task.
enum NodeOutcome {
    Deployed(ResolvedEntity),
    Excluded,
    Failed(DeployerError),
}

/// Validate every environment's dependency graph without deploying anything.
pub fn validate(project: &Project) -> Result<()> {
    for environment in project.environment_names() {
        let configs = project.configs_for_environment(&environment);
        build_component_graphs(&configs)?;
    }
    Ok(())
}

/// Deploy the whole project: configuration graphs per environment, then the
/// account IAM bundles. Returns the per-environment error aggregate when
/// anything failed hard.
pub async fn deploy(
    project: &Project,
    clients: &EnvironmentClients,
    account_clients: &HashMap<String, Arc<dyn AccountClient>>,
    flags: &FeatureFlags,
    options: &DeployOptions,
) -> std::result::Result<(), EnvironmentDeploymentErrors> {
    let mut errors = EnvironmentDeploymentErrors::default();

    // Validation is fatal and runs before any deploy starts.
    if let Err(err) = validate(project) {
        let coordinate = validation_coordinate(&err);
        errors.push("validation", CoordinateError { coordinate, error: err });
        return Err(errors);
    }

    for environment in project.environment_names() {
        let Some(client_set) = clients.get(&environment) else {
            errors.push(
                &environment,
                CoordinateError {
                    coordinate: Coordinate::new(environment.clone(), "environment", "clients"),
                    error: DeployerError::Config(format!(
                        "no client set for environment '{environment}'"
                    )),
                },
            );
            if !options.continue_on_error && !options.dry_run {
                return Err(errors);
            }
            continue;
        };

        let span = info_span!("deploy", environment = %environment, dry_run = options.dry_run);
        let configs = project.configs_for_environment(&environment);
        let environment_errors = async {
            info!(configs = configs.len(), "deploying environment");
            deploy_environment(&environment, configs, client_set, flags, options).await
        }
        .instrument(span)
        .await;
        let failed = !environment_errors.is_empty();
        for error in environment_errors {
            errors.push(&environment, error);
        }
        if failed && !options.continue_on_error && !options.dry_run {
            return Err(errors);
        }
    }

    for bundle in &project.accounts {
        let name = &bundle.account.name;
        let Some(client) = account_clients.get(name) else {
            errors.push(
                &format!("account:{name}"),
                CoordinateError {
                    coordinate: Coordinate::new(name.clone(), "account", "clients"),
                    error: DeployerError::Config(format!("no account client for '{name}'")),
                },
            );
            continue;
        };
        if let Err(err) = account_deployer::deploy(
            bundle,
            client.clone(),
            options.concurrent_requests,
            flags,
        )
        .await
        {
            errors.push(
                &format!("account:{name}"),
                CoordinateError {
                    coordinate: Coordinate::new(name.clone(), "account", "iam"),
                    error: err,
                },
            );
            if !options.continue_on_error && !options.dry_run {
                return Err(errors);
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn validation_coordinate(err: &DeployerError) -> Coordinate {
    match err {
        DeployerError::DuplicateCoordinate(coordinate) => coordinate.clone(),
        DeployerError::UnknownReference { coordinate, .. } => coordinate.clone(),
        DeployerError::CircularDependency { members } => members
            .first()
            .cloned()
            .unwrap_or_else(|| Coordinate::new("unknown", "unknown", "unknown")),
        _ => Coordinate::new("unknown", "unknown", "unknown"),
    }
}

/// Deploy one environment: partition into components and schedule each
/// independently. Returns the hard errors of the environment.
async fn deploy_environment(
    environment: &str,
    configs: Vec<Config>,
    client_set: &ClientSet,
    flags: &FeatureFlags,
    options: &DeployOptions,
) -> Vec<CoordinateError> {
    let components = match build_component_graphs(&configs) {
        Ok(components) => components,
        Err(err) => {
            let coordinate = validation_coordinate(&err);
            return vec![CoordinateError { coordinate, error: err }];
        }
    };

    let config_index: Arc<HashMap<Coordinate, Config>> = Arc::new(
        configs
            .into_iter()
            .map(|config| (config.coordinate.clone(), config))
            .collect(),
    );
    let entities = Arc::new(EntityMap::new());
    let semaphore = Arc::new(Semaphore::new(options.concurrent_requests));

    let mut component_tasks = JoinSet::new();
    for component in components {
        let environment = environment.to_string();
        let config_index = config_index.clone();
        let entities = entities.clone();
        let semaphore = semaphore.clone();
        let client_set = client_set.clone();
        let flags = flags.clone();
        component_tasks.spawn(async move {
            deploy_component(
                &environment,
                component,
                config_index,
                client_set,
                entities,
                semaphore,
                flags,
            )
            .await
        });
    }

    let mut errors = Vec::new();
    while let Some(joined) = component_tasks.join_next().await {
        match joined {
            Ok(component_errors) => errors.extend(component_errors),
            Err(join_err) => errors.push(CoordinateError {
                coordinate: Coordinate::new(environment.to_string(), "internal", "component-task"),
                error: DeployerError::Other(format!("component task aborted: {join_err}")),
            }),
        }
    }
    errors
}

/// Schedule one weakly connected component: repeatedly take the current root
/// batch, run one task per root on the shared worker pool, then propagate
/// skips to the descendants of everything that did not deploy.
async fn deploy_component(
    environment: &str,
    mut working: ComponentGraph,
    config_index: Arc<HashMap<Coordinate, Config>>,
    client_set: ClientSet,
    entities: Arc<EntityMap>,
    semaphore: Arc<Semaphore>,
    flags: FeatureFlags,
) -> Vec<CoordinateError> {
    let mut errors = Vec::new();

    while !working.is_empty() {
        let roots = working.roots();
        let mut outcomes: HashMap<Coordinate, NodeOutcome> = HashMap::new();
        let mut tasks = JoinSet::new();

        for coordinate in &roots {
            let Some(config) = config_index.get(coordinate).cloned() else {
                outcomes.insert(
                    coordinate.clone(),
                    NodeOutcome::Failed(DeployerError::Other(format!(
                        "no configuration for graph node {coordinate}"
                    ))),
                );
                continue;
            };

            if config.skip || !handlers::is_enabled(&config.config_type, &flags) {
                outcomes.insert(coordinate.clone(), NodeOutcome::Excluded);
                continue;
            }

            if let Some(wait) = handlers::deploy_wait(&config.config_type) {
                sleep(wait).await;
            }

            let semaphore = semaphore.clone();
            let client_set = client_set.clone();
            let entities = entities.clone();
            let flags = flags.clone();
            tasks.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                let outcome = match permit {
                    Ok(_permit) => {
                        let ctx = DeployContext {
                            clients: &client_set,
                            entities: &entities,
                            flags: &flags,
                        };
                        match handlers::deploy_config(&ctx, &config).await {
                            Ok(entity) => NodeOutcome::Deployed(entity),
                            Err(err) => NodeOutcome::Failed(err),
                        }
                    }
                    Err(err) => NodeOutcome::Failed(DeployerError::Other(format!(
                        "worker pool closed: {err}"
                    ))),
                };
                (config.coordinate.clone(), outcome)
            });
        }

        // Barrier: all root tasks finish before any cleanup happens, so skip
        // reports are deterministic.
        while let Some(joined) = tasks.join_next().await {
            if let Ok((coordinate, outcome)) = joined {
                outcomes.insert(coordinate, outcome);
            }
        }

        for root in &roots {
            let outcome = outcomes.remove(root).unwrap_or_else(|| {
                NodeOutcome::Failed(DeployerError::Other("node task aborted".to_string()))
            });
            match outcome {
                NodeOutcome::Deployed(entity) => {
                    report::success(environment, root, &entity.id);
                    entities.publish(entity);
                    working.remove(root);
                }
                NodeOutcome::Excluded => {
                    report::excluded(environment, root);
                    propagate_skip(environment, &mut working, root);
                    working.remove(root);
                }
                NodeOutcome::Failed(error) => {
                    report::failed(environment, root, &error);
                    errors.push(CoordinateError {
                        coordinate: root.clone(),
                        error,
                    });
                    propagate_skip(environment, &mut working, root);
                    working.remove(root);
                }
            }
        }
    }

    errors
}

/// Mark every transitive dependent of `root` as skipped and drop it from the
/// working copy, reporting both the direct parent and the root cause.
fn propagate_skip(environment: &str, working: &mut ComponentGraph, root: &Coordinate) {
    let descendants = working.descendants(root);
    let skipped: HashSet<Coordinate> = descendants.iter().cloned().collect();
    for descendant in &descendants {
        if !working.contains(descendant) {
            continue;
        }
        let cause = working
            .parents(descendant)
            .into_iter()
            .find(|parent| parent == root || skipped.contains(parent))
            .unwrap_or_else(|| root.clone());
        report::skipped(environment, descendant, &cause, root);
        working.remove(descendant);
    }
}
