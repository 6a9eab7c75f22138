use tracing::{error, info};

use crate::coordinate::Coordinate;
use crate::error::DeployerError;

/// Terminal state of one configuration within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    Success,
    /// The config skipped itself (skip flag or disabled family).
    Excluded,
    /// An ancestor failed or was skipped.
    Skipped,
    Failed,
}

impl DeployState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployState::Success => "DEPL_SUCCESS",
            DeployState::Excluded => "DEPL_EXCLUDED",
            DeployState::Skipped => "DEPL_SKIPPED",
            DeployState::Failed => "DEPL_FAILED",
        }
    }
}

pub fn success(environment: &str, coordinate: &Coordinate, remote_id: &str) {
    info!(
        environment,
        coordinate = %coordinate,
        remote_id,
        state = DeployState::Success.as_str(),
        "configuration deployed"
    );
}

pub fn excluded(environment: &str, coordinate: &Coordinate) {
    info!(
        environment,
        coordinate = %coordinate,
        state = DeployState::Excluded.as_str(),
        "configuration excluded from this run"
    );
}

pub fn skipped(
    environment: &str,
    coordinate: &Coordinate,
    cause: &Coordinate,
    root_cause: &Coordinate,
) {
    info!(
        environment,
        coordinate = %coordinate,
        cause = %cause,
        root_cause = %root_cause,
        state = DeployState::Skipped.as_str(),
        "configuration skipped because an ancestor did not deploy"
    );
}

pub fn failed(environment: &str, coordinate: &Coordinate, err: &DeployerError) {
    error!(
        environment,
        coordinate = %coordinate,
        state = DeployState::Failed.as_str(),
        "configuration failed to deploy: {err}"
    );
}
