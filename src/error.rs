use std::io;

use thiserror::Error;

use crate::coordinate::Coordinate;

#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("circular dependency between configurations: {}", fmt_coordinates(.members))]
    CircularDependency { members: Vec<Coordinate> },

    #[error("duplicate coordinate {0} in project")]
    DuplicateCoordinate(Coordinate),

    #[error("{coordinate} references unknown configuration {referenced}")]
    UnknownReference {
        coordinate: Coordinate,
        referenced: Coordinate,
    },

    #[error("environment variable '{name}' required by {coordinate} is not set")]
    MissingEnvVar { coordinate: Coordinate, name: String },

    #[error(
        "reference to {referenced} was not resolved before {coordinate} was deployed; this is a bug in the dependency ordering"
    )]
    UnresolvedReference {
        coordinate: Coordinate,
        referenced: Coordinate,
    },

    #[error("parameter '{parameter}' of {coordinate} failed to resolve: {reason}")]
    Parameter {
        coordinate: Coordinate,
        parameter: String,
        reason: String,
    },

    #[error("API request rejected (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error(
        "payload for {coordinate} uses the classic dashboard format (a 'tiles' array) and cannot be deployed through the documents API"
    )]
    WrongPayloadType { coordinate: Coordinate },

    #[error("unknown account references: {}", .ids.join(", "))]
    UnknownAccountReferences { ids: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("telemetry initialization error: {0}")]
    Telemetry(String),

    #[error("unexpected error: {0}")]
    Other(String),
}

impl DeployerError {
    /// HTTP status carried by an API rejection, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeployerError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

fn fmt_coordinates(members: &[Coordinate]) -> String {
    members
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, DeployerError>;
