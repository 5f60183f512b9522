use arcstr::ArcStr;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use bustrack_geo::BatchResults;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::spawn_blocking;

use crate::bustrack_web::handlers::{json_body, WebError};
use crate::bustrack_web::AppState;

#[derive(Deserialize)]
pub struct GeocodeQuery {
    lat: Option<String>,
    lng: Option<String>,
}

#[derive(Serialize)]
pub struct PlaceView {
    place: ArcStr,
}

#[derive(Serialize)]
pub struct BatchView {
    results: BatchResults,
}

/// Resolves a single `lat`/`lng` pair. Both must be finite numbers, an empty
/// value is rejected rather than read as zero.
pub async fn handle_geocode_get(
    State(state): State<AppState>,
    query: Result<Query<GeocodeQuery>, QueryRejection>,
) -> Result<Json<PlaceView>, WebError> {
    let Query(query) = query.map_err(|_| invalid_coordinates())?;

    let coordinates = (
        query.lat.as_deref().and_then(parse_coordinate),
        query.lng.as_deref().and_then(parse_coordinate),
    );

    let (Some(latitude), Some(longitude)) = coordinates else {
        return Err(invalid_coordinates());
    };

    let geocoder = state.geocoder.clone();
    let resolved = spawn_blocking(move || geocoder.reverse(latitude, longitude))
        .await
        .map_err(|err| WebError::internal("Geocode error", err))?;

    Ok(Json(PlaceView { place: resolved.place }))
}

/// Resolves the list of `{lat, lng}` objects in `coords`. Entries that are not
/// a pair of finite numbers are skipped, a body without such a list yields no
/// results.
pub async fn handle_geocode_batch_post(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchView>, WebError> {
    let coords = match json_body(body)?.get_mut("coords").map(Value::take) {
        Some(Value::Array(coords)) => coords,
        _ => Vec::new(),
    };

    let geocoder = state.geocoder.clone();
    let results = spawn_blocking(move || geocoder.reverse_batch(coords.iter().map(coordinate_pair)))
        .await
        .map_err(|err| WebError::internal("Batch geocode error", err))?;

    Ok(Json(BatchView { results }))
}

fn invalid_coordinates() -> WebError {
    WebError::bad_request("Invalid lat/lng")
}

fn parse_coordinate(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

fn coordinate_pair(value: &Value) -> Option<(f64, f64)> {
    Some((number(value.get("lat")?)?, number(value.get("lng")?)?))
}

// json numbers and numeric strings both count
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
        Value::String(text) => parse_coordinate(text),
        _ => None,
    }
}
