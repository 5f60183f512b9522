use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bustrack::{Bus, BusDetails, BusId, BusStatus, Location, RouteId};
use crate::bustrack_web::handlers::{json_body, WebError};
use crate::bustrack_web::AppState;

#[derive(Deserialize)]
pub struct BusesQuery {
    route_id: Option<String>,
    date: Option<String>,
}

#[derive(Serialize)]
pub struct StatusView {
    status: BusStatus,
}

#[derive(Serialize)]
pub struct LocationUpdated {
    message: &'static str,
    bus_id: BusId,
    current_location: Location,
    last_updated: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct StatusUpdated {
    message: &'static str,
    bus_id: BusId,
    status: BusStatus,
    last_updated: DateTime<Utc>,
}

/// Lists buses, optionally of one route. With a `date` every bus reports its
/// snapshot of that day if it has one.
pub async fn handle_buses_get(
    State(state): State<AppState>,
    query: Result<Query<BusesQuery>, QueryRejection>,
) -> Result<Json<Vec<Bus>>, WebError> {
    let Query(query) = query.map_err(|_| WebError::bad_request("Invalid query string"))?;

    let route = match non_empty(query.route_id.as_deref()) {
        Some(value) => Some(value.parse::<RouteId>().map_err(|_| WebError::bad_request("Invalid route_id"))?),
        None => None,
    };

    let buses = match non_empty(query.date.as_deref()) {
        Some(value) => {
            let day = parse_day(value).ok_or_else(|| WebError::bad_request("Invalid date format. Use YYYY-MM-DD."))?;
            state.store.buses_on(route, day).await?
        }

        None => state.store.buses(route).await?,
    };

    Ok(Json(buses))
}

pub async fn handle_bus_get(
    State(state): State<AppState>,
    path: Result<Path<BusId>, PathRejection>,
) -> Result<Json<BusDetails>, WebError> {
    let bus_id = path_bus_id(path)?;
    let details = state.store.bus_details(bus_id).await?.ok_or_else(bus_not_found)?;
    Ok(Json(details))
}

pub async fn handle_location_get(
    State(state): State<AppState>,
    path: Result<Path<BusId>, PathRejection>,
) -> Result<Json<Location>, WebError> {
    let bus_id = path_bus_id(path)?;
    let bus = state.store.bus(bus_id).await?.ok_or_else(bus_not_found)?;
    Ok(Json(bus.current_location))
}

pub async fn handle_status_get(
    State(state): State<AppState>,
    path: Result<Path<BusId>, PathRejection>,
) -> Result<Json<StatusView>, WebError> {
    let bus_id = path_bus_id(path)?;
    let bus = state.store.bus(bus_id).await?.ok_or_else(bus_not_found)?;
    Ok(Json(StatusView { status: bus.status }))
}

pub async fn handle_location_patch(
    State(state): State<AppState>,
    path: Result<Path<BusId>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LocationUpdated>, WebError> {
    let bus_id = path_bus_id(path)?;
    let body = json_body(body)?;

    let coordinates = (
        body.get("latitude").and_then(Value::as_f64),
        body.get("longitude").and_then(Value::as_f64),
    );

    let (Some(latitude), Some(longitude)) = coordinates else {
        return Err(WebError::bad_request("latitude and longitude (numbers) required"));
    };

    let location = Location { latitude, longitude };
    let last_updated = state.store.move_bus(bus_id, location).await?.ok_or_else(bus_not_found)?;

    Ok(Json(LocationUpdated {
        message: "Location updated",
        bus_id,
        current_location: location,
        last_updated,
    }))
}

pub async fn handle_status_patch(
    State(state): State<AppState>,
    path: Result<Path<BusId>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<StatusUpdated>, WebError> {
    let bus_id = path_bus_id(path)?;
    let body = json_body(body)?;

    let status = body.get("status")
        .and_then(Value::as_str)
        .and_then(|status| status.parse::<BusStatus>().ok())
        .ok_or_else(|| WebError::bad_request(r#"status must be "On Time" or "Delayed""#))?;

    let last_updated = state.store.set_status(bus_id, status).await?.ok_or_else(bus_not_found)?;

    Ok(Json(StatusUpdated {
        message: "Status updated",
        bus_id,
        status,
        last_updated,
    }))
}

fn bus_not_found() -> WebError {
    WebError::not_found("Bus not found")
}

// an id that is not a number names no bus
fn path_bus_id(path: Result<Path<BusId>, PathRejection>) -> Result<BusId, WebError> {
    path.map(|Path(bus_id)| bus_id).map_err(|_| bus_not_found())
}

pub(super) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(super) fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
