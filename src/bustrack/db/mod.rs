use std::ops::DerefMut;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::bustrack::{Bus, BusId, BusStatus, DailyLocation, Location, RouteId};

pub mod route;

/// Opens the database and brings the schema up to date.
pub async fn open(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parse database url {:?}", url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// A private in-memory database. It lives as long as its single connection.
#[cfg(test)]
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct BusRow {
    pub bus_id: BusId,
    pub route_id: RouteId,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<BusRow> for Bus {
    type Error = anyhow::Error;

    fn try_from(row: BusRow) -> Result<Self> {
        Ok(Self {
            bus_id: row.bus_id,
            route_id: row.route_id,
            status: row.status.parse()?,
            current_location: Location {
                latitude: row.latitude,
                longitude: row.longitude,
            },
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DailyLocationRow {
    pub bus_id: BusId,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
}

impl DailyLocationRow {
    fn into_daily(self) -> Result<(BusId, DailyLocation)> {
        let daily = DailyLocation {
            date: self.recorded_at,
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            status: self.status.parse()?,
        };

        Ok((self.bus_id, daily))
    }
}

pub async fn list_buses(tx: &mut Transaction<'_, Sqlite>, route: Option<RouteId>) -> Result<Vec<Bus>> {
    let rows: Vec<BusRow> = sqlx::query_as("SELECT * FROM bus WHERE ? IS NULL OR route_id = ? ORDER BY bus_id")
        .bind(route)
        .bind(route)
        .fetch_all(tx.deref_mut())
        .await?;

    rows.into_iter().map(Bus::try_from).collect()
}

pub async fn read_bus(tx: &mut Transaction<'_, Sqlite>, id: BusId) -> Result<Option<Bus>> {
    let row: Option<BusRow> = sqlx::query_as("SELECT * FROM bus WHERE bus_id=?")
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    // get the single row if any
    let Some(row) = row else { return Ok(None); };
    Ok(Some(row.try_into()?))
}

pub async fn count_buses(tx: &mut Transaction<'_, Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM bus")
        .fetch_one(tx.deref_mut())
        .await?;

    Ok(count)
}

/// Inserts the bus or overwrites the current state of an existing one.
pub async fn store_bus(tx: &mut Transaction<'_, Sqlite>, bus: &Bus) -> Result<()> {
    sqlx::query("INSERT INTO bus (bus_id, route_id, status, latitude, longitude, last_updated) VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (bus_id) DO UPDATE SET route_id=excluded.route_id, status=excluded.status, \
                 latitude=excluded.latitude, longitude=excluded.longitude, last_updated=excluded.last_updated")
        .bind(bus.bus_id)
        .bind(bus.route_id)
        .bind(bus.status.as_str())
        .bind(bus.current_location.latitude)
        .bind(bus.current_location.longitude)
        .bind(bus.last_updated)
        .execute(tx.deref_mut())
        .await?;

    Ok(())
}

/// Moves a bus. Returns false if there is no such bus.
pub async fn update_bus_location(
    tx: &mut Transaction<'_, Sqlite>,
    id: BusId,
    location: Location,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE bus SET latitude=?, longitude=?, last_updated=? WHERE bus_id=?")
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(now)
        .bind(id)
        .execute(tx.deref_mut())
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Sets the status of a bus. Returns false if there is no such bus.
pub async fn update_bus_status(
    tx: &mut Transaction<'_, Sqlite>,
    id: BusId,
    status: BusStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE bus SET status=?, last_updated=? WHERE bus_id=?")
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(tx.deref_mut())
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Moves a bus relative to its stored location and flips its stored status
/// if asked to. Returns false if there is no such bus.
pub async fn shift_bus(
    tx: &mut Transaction<'_, Sqlite>,
    id: BusId,
    delta: Location,
    flip: bool,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query("UPDATE bus SET latitude=latitude + ?, longitude=longitude + ?, \
                              status=CASE WHEN ? THEN (CASE status WHEN ? THEN ? ELSE ? END) ELSE status END, \
                              last_updated=? WHERE bus_id=?")
        .bind(delta.latitude)
        .bind(delta.longitude)
        .bind(flip)
        .bind(BusStatus::OnTime.as_str())
        .bind(BusStatus::Delayed.as_str())
        .bind(BusStatus::OnTime.as_str())
        .bind(now)
        .bind(id)
        .execute(tx.deref_mut())
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Stores the snapshot of a bus, replacing an existing one of the same day.
pub async fn store_daily_location(tx: &mut Transaction<'_, Sqlite>, id: BusId, daily: &DailyLocation) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO bus_daily_location (bus_id, day, recorded_at, latitude, longitude, status) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(id)
        .bind(daily.date.date_naive())
        .bind(daily.date)
        .bind(daily.location.latitude)
        .bind(daily.location.longitude)
        .bind(daily.status.as_str())
        .execute(tx.deref_mut())
        .await?;

    Ok(())
}

pub async fn read_daily_locations(tx: &mut Transaction<'_, Sqlite>, id: BusId) -> Result<Vec<DailyLocation>> {
    let rows: Vec<DailyLocationRow> = sqlx::query_as("SELECT * FROM bus_daily_location WHERE bus_id=? ORDER BY day")
        .bind(id)
        .fetch_all(tx.deref_mut())
        .await?;

    rows.into_iter()
        .map(|row| row.into_daily().map(|(_, daily)| daily))
        .collect()
}

/// All snapshots recorded for the given day.
pub async fn daily_locations_on(tx: &mut Transaction<'_, Sqlite>, day: NaiveDate) -> Result<Vec<(BusId, DailyLocation)>> {
    let rows: Vec<DailyLocationRow> = sqlx::query_as("SELECT * FROM bus_daily_location WHERE day=?")
        .bind(day)
        .fetch_all(tx.deref_mut())
        .await?;

    rows.into_iter().map(DailyLocationRow::into_daily).collect()
}

/// Removes all routes, buses and their snapshots.
pub async fn purge(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    sqlx::query("DELETE FROM bus_daily_location")
        .execute(tx.deref_mut())
        .await?;

    sqlx::query("DELETE FROM bus")
        .execute(tx.deref_mut())
        .await?;

    sqlx::query("DELETE FROM bus_route")
        .execute(tx.deref_mut())
        .await?;

    Ok(())
}
