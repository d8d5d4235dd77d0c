//! Network topology handlers

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        State,
    },
    Form, Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validation_error;
use crate::{AppResult, AppState};
use crate::error::ScanError;
use crate::models::{Connection, Endpoint};
use crate::pipeline::{paths, Topology};

#[derive(Debug, Deserialize)]
pub struct GraphRequest {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub connections: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<Endpoint>,
    pub edges: Vec<Connection>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PathForm {
    #[validate(length(min = 1, max = 2048))]
    pub start: String,
    #[validate(length(min = 1, max = 2048))]
    pub end: String,
    /// JSON array of endpoint names
    pub endpoints: Option<String>,
    /// JSON array of [source, target] pairs
    pub connections: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    /// First shortest path; empty when unreachable
    pub path: Vec<Endpoint>,
    /// Every shortest path, capped at MAX_ATTACK_PATHS
    pub paths: Vec<Vec<Endpoint>>,
}

fn to_connections(pairs: Vec<Vec<String>>) -> Result<Vec<Connection>, ScanError> {
    pairs.into_iter().map(Connection::try_from).collect()
}

/// Build a graph and list its nodes and edges
pub async fn graph(
    payload: Result<Json<GraphRequest>, JsonRejection>,
) -> AppResult<Json<GraphResponse>> {
    let Json(req) = payload?;
    let connections = to_connections(req.connections)?;
    let topology = Topology::build(&req.endpoints, &connections);

    Ok(Json(GraphResponse {
        nodes: topology.nodes(),
        edges: topology.edges(),
    }))
}

/// Shortest attack paths between two nodes
pub async fn attack_paths(
    State(state): State<AppState>,
    payload: Result<Form<PathForm>, FormRejection>,
) -> AppResult<Json<PathResponse>> {
    let Form(form) = payload?;
    form.validate().map_err(validation_error)?;

    let endpoints: Vec<Endpoint> = parse_json_field("endpoints", form.endpoints.as_deref())?;
    let pairs: Vec<Vec<String>> = parse_json_field("connections", form.connections.as_deref())?;
    let topology = Topology::build(&endpoints, &to_connections(pairs)?);

    let path = paths::shortest_path(&topology, &form.start, &form.end)?;
    let limit = state.config.scan.max_attack_paths;
    let paths = if path.is_empty() {
        Vec::new()
    } else {
        paths::all_shortest_paths(&topology, &form.start, &form.end, limit)?
    };

    Ok(Json(PathResponse { path, paths }))
}

fn parse_json_field<T: serde::de::DeserializeOwned + Default>(field: &str, raw: Option<&str>) -> Result<T, ScanError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(T::default()),
        Some(v) => serde_json::from_str(v)
            .map_err(|e| ScanError::Input(format!("{} is not valid JSON: {}", field, e))),
    }
}
