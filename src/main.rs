use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use opsgrid_deployer::account::client::{AccountClient, DryRunAccountClient, HttpAccountClient};
use opsgrid_deployer::client::EnvironmentClients;
use opsgrid_deployer::config::{Action, CliArgs, DeployerConfig};
use opsgrid_deployer::deploy::{self, DeployOptions};
use opsgrid_deployer::model::Project;
use opsgrid_deployer::telemetry;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = match DeployerConfig::from_env_and_args(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = telemetry::init(&config.log) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = run(config).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(config: DeployerConfig) -> anyhow::Result<()> {
    let mut project = Project::from_manifest_file(&config.manifest)
        .with_context(|| format!("loading {}", config.manifest.display()))?;

    if !config.environments.is_empty() {
        project
            .configs
            .retain(|entry| config.environments.contains(&entry.environment));
        project
            .environments
            .retain(|entry| config.environments.contains(&entry.name));
    }

    match config.action {
        Action::Validate => {
            deploy::validate(&project).context("project validation failed")?;
            println!(
                "Project is valid: {} configuration(s) across {} environment(s).",
                project.configs.len(),
                project.environment_names().len()
            );
            Ok(())
        }
        Action::Deploy => {
            let clients = if config.dry_run {
                EnvironmentClients::dry_run_for_project(&project)
            } else {
                EnvironmentClients::live_for_project(&project, &config.flags)
                    .context("constructing environment clients")?
            };

            let mut account_clients: HashMap<String, Arc<dyn AccountClient>> = HashMap::new();
            for bundle in &project.accounts {
                let client: Arc<dyn AccountClient> = if config.dry_run {
                    Arc::new(DryRunAccountClient)
                } else {
                    Arc::new(
                        HttpAccountClient::new(
                            &bundle.account,
                            config.flags.insecure_skip_verify,
                        )
                        .with_context(|| {
                            format!("constructing client for account '{}'", bundle.account.name)
                        })?,
                    )
                };
                account_clients.insert(bundle.account.name.clone(), client);
            }

            let options = DeployOptions {
                dry_run: config.dry_run,
                continue_on_error: config.continue_on_error,
                concurrent_requests: config.concurrent_requests,
            };

            match deploy::deploy(&project, &clients, &account_clients, &config.flags, &options)
                .await
            {
                Ok(()) => {
                    println!("Deployment finished without errors.");
                    Ok(())
                }
                Err(errors) => {
                    eprint!("{errors}");
                    std::process::exit(1);
                }
            }
        }
    }
}
