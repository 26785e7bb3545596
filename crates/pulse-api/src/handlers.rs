//! ---
//! pulse_section: "05-networking-external-interfaces"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Service operations and the HTTP handlers exposing them."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Json;
use bytes::Bytes;
use pulse_common::time::iso_timestamp;
use pulse_common::{SERVICE_NAME, SERVICE_VERSION};
use pulse_logging::{call_instrumented, TracingObserver};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ApiState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceIndex {
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataItem {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataListing {
    pub data: Vec<DataItem>,
    pub count: usize,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedRecord {
    pub id: String,
    pub created: bool,
    pub timestamp: String,
    pub data: Value,
}

pub fn health_check() -> Result<HealthReport> {
    info!("Health check requested");
    Ok(HealthReport {
        status: "healthy",
        timestamp: iso_timestamp(),
        version: SERVICE_VERSION,
    })
}

pub fn get_data() -> Result<DataListing> {
    info!("Data requested");
    let data: Vec<DataItem> = (1..=3)
        .map(|id| DataItem {
            id,
            name: format!("Item {id}"),
        })
        .collect();
    Ok(DataListing {
        count: data.len(),
        data,
        timestamp: iso_timestamp(),
    })
}

/// Accept a new record. Nothing is persisted; the payload is echoed back.
pub fn create_data(payload: Value) -> Result<CreatedRecord> {
    info!("Creating new data: {payload}");
    Ok(CreatedRecord {
        id: Uuid::new_v4().to_string(),
        created: true,
        timestamp: iso_timestamp(),
        data: payload,
    })
}

pub(crate) async fn index(State(state): State<Arc<ApiState>>) -> Json<ServiceIndex> {
    Json(ServiceIndex {
        service: SERVICE_NAME,
        version: SERVICE_VERSION,
        environment: state.environment().to_owned(),
    })
}

pub(crate) async fn health() -> Result<Json<HealthReport>, ApiError> {
    let report = call_instrumented(&TracingObserver, "health_check", (), |()| health_check())?;
    Ok(Json(report))
}

pub(crate) async fn list_data() -> Result<Json<DataListing>, ApiError> {
    let listing = call_instrumented(&TracingObserver, "get_data", (), |()| get_data())?;
    Ok(Json(listing))
}

pub(crate) async fn create(body: Bytes) -> Result<(StatusCode, Json<CreatedRecord>), ApiError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "rejecting request body");
        ApiError::InvalidJson
    })?;
    let record = call_instrumented(&TracingObserver, "create_data", payload, create_data)?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub(crate) async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        path: uri.path().to_owned(),
    }
}
