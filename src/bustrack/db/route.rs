use std::ops::DerefMut;

use anyhow::Result;
use sqlx::{FromRow, Sqlite, Transaction};

use crate::bustrack::{Route, RouteId};

#[derive(FromRow)]
struct RouteRow {
    route_id: RouteId,
    route_name: String,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Self {
            route_id: row.route_id,
            route_name: row.route_name,
        }
    }
}

pub async fn store(tx: &mut Transaction<'_, Sqlite>, route: &Route) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO bus_route (route_id, route_name) VALUES (?, ?)")
        .bind(route.route_id)
        .bind(&route.route_name)
        .execute(tx.deref_mut())
        .await?;

    Ok(())
}

pub async fn load(tx: &mut Transaction<'_, Sqlite>, id: RouteId) -> Result<Option<Route>> {
    let row: Option<RouteRow> = sqlx::query_as("SELECT route_id, route_name FROM bus_route WHERE route_id=?")
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(Route::from))
}

pub async fn list(tx: &mut Transaction<'_, Sqlite>) -> Result<Vec<Route>> {
    let rows: Vec<RouteRow> = sqlx::query_as("SELECT route_id, route_name FROM bus_route ORDER BY route_id")
        .fetch_all(tx.deref_mut())
        .await?;

    Ok(rows.into_iter().map(Route::from).collect())
}
