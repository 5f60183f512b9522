use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use itertools::Itertools;
use serde::Deserialize;

use crate::bustrack::schedule::{self, Trip, Window};
use crate::bustrack::{Route, RouteId};
use crate::bustrack_web::handlers::buses::{non_empty, parse_day};
use crate::bustrack_web::handlers::WebError;
use crate::bustrack_web::AppState;

const DEFAULT_HEADWAY: u32 = 45;

#[derive(Deserialize)]
pub struct ScheduleQuery {
    date: Option<String>,
    headway: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

pub async fn handle_routes_get(State(state): State<AppState>) -> Result<Json<Vec<Route>>, WebError> {
    Ok(Json(state.store.routes().await?))
}

pub async fn handle_route_get(
    State(state): State<AppState>,
    path: Result<Path<RouteId>, PathRejection>,
) -> Result<Json<Route>, WebError> {
    let route_id = path_route_id(path)?;
    let route = state.store.route(route_id).await?.ok_or_else(route_not_found)?;
    Ok(Json(route))
}

/// Builds the departures of a route for one day. The buses of the route take
/// turns in order of their id. A given `date` must be valid but does not
/// change the timetable.
pub async fn handle_schedule_get(
    State(state): State<AppState>,
    path: Result<Path<RouteId>, PathRejection>,
    query: Result<Query<ScheduleQuery>, QueryRejection>,
) -> Result<Json<Vec<Trip>>, WebError> {
    let route_id = path_route_id(path)?;
    let Query(query) = query.map_err(|_| WebError::bad_request("Invalid query string"))?;

    let route = state.store.route(route_id).await?.ok_or_else(route_not_found)?;

    if let Some(value) = non_empty(query.date.as_deref()) {
        parse_day(value).ok_or_else(|| WebError::bad_request("Invalid date. Use YYYY-MM-DD."))?;
    }

    let headway = match non_empty(query.headway.as_deref()) {
        Some(value) => value.parse::<u32>()
            .map_err(|_| WebError::bad_request("headway must be a whole number of minutes."))?
            .max(1),
        None => DEFAULT_HEADWAY,
    };

    let window = match (non_empty(query.start.as_deref()), non_empty(query.end.as_deref())) {
        (None, None) => Window::default(),
        (start, end) => Window::parse(start.unwrap_or("05:00"), end.unwrap_or("22:00"))
            .ok_or_else(|| WebError::bad_request("end must be after start (HH:mm)."))?,
    };

    let buses = state.store.buses(Some(route_id)).await?
        .into_iter()
        .map(|bus| bus.bus_id)
        .collect_vec();

    Ok(Json(schedule::trips(&route, &buses, window, headway)))
}

fn route_not_found() -> WebError {
    WebError::not_found("Route not found")
}

fn path_route_id(path: Result<Path<RouteId>, PathRejection>) -> Result<RouteId, WebError> {
    path.map(|Path(route_id)| route_id).map_err(|_| route_not_found())
}
