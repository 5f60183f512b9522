use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::bustrack::{db, Bus, BusDetails, BusId, BusStatus, DailyLocation, Location, Movement, Route, RouteId};

/// Access to the routes and buses in the database.
#[derive(Clone)]
pub struct BusStore {
    db: SqlitePool,
}

impl BusStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn routes(&self) -> Result<Vec<Route>> {
        let mut tx = self.db.begin().await?;
        db::route::list(&mut tx).await
    }

    pub async fn route(&self, id: RouteId) -> Result<Option<Route>> {
        let mut tx = self.db.begin().await?;
        db::route::load(&mut tx, id).await
    }

    /// All buses ordered by id, optionally only those of one route.
    pub async fn buses(&self, route: Option<RouteId>) -> Result<Vec<Bus>> {
        let mut tx = self.db.begin().await?;
        db::list_buses(&mut tx, route).await
    }

    /// Like [BusStore::buses], but a bus with a snapshot recorded on `day`
    /// reports the status and location of that snapshot.
    #[instrument(skip(self))]
    pub async fn buses_on(&self, route: Option<RouteId>, day: NaiveDate) -> Result<Vec<Bus>> {
        let mut tx = self.db.begin().await?;

        let buses = db::list_buses(&mut tx, route).await?;

        let mut snapshots: HashMap<BusId, DailyLocation> = db::daily_locations_on(&mut tx, day)
            .await?
            .into_iter()
            .collect();

        let buses = buses.into_iter()
            .map(|bus| match snapshots.remove(&bus.bus_id) {
                None => bus,
                Some(daily) => Bus {
                    status: daily.status,
                    current_location: daily.location,
                    last_updated: daily.date,
                    ..bus
                },
            })
            .collect();

        Ok(buses)
    }

    pub async fn bus(&self, id: BusId) -> Result<Option<Bus>> {
        let mut tx = self.db.begin().await?;
        db::read_bus(&mut tx, id).await
    }

    pub async fn bus_details(&self, id: BusId) -> Result<Option<BusDetails>> {
        let mut tx = self.db.begin().await?;

        let Some(bus) = db::read_bus(&mut tx, id).await? else {
            return Ok(None);
        };

        let daily_locations = db::read_daily_locations(&mut tx, id).await?;
        Ok(Some(BusDetails { bus, daily_locations }))
    }

    /// Moves a bus and returns its new update timestamp, or None if the
    /// bus does not exist.
    #[instrument(skip(self))]
    pub async fn move_bus(&self, id: BusId, location: Location) -> Result<Option<DateTime<Utc>>> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let updated = db::update_bus_location(&mut tx, id, location, now).await?;
        tx.commit().await?;

        Ok(updated.then_some(now))
    }

    /// Sets the status of a bus and returns its new update timestamp, or
    /// None if the bus does not exist.
    #[instrument(skip(self))]
    pub async fn set_status(&self, id: BusId, status: BusStatus) -> Result<Option<DateTime<Utc>>> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let updated = db::update_bus_status(&mut tx, id, status, now).await?;
        tx.commit().await?;

        Ok(updated.then_some(now))
    }

    /// Applies all movements in one transaction. Each one is relative to the
    /// stored state of its bus, so updates committed since the buses were
    /// read are kept. Returns the number of buses that still existed.
    #[instrument(skip_all, fields(buses = movements.len()))]
    pub async fn shift(&self, movements: &[Movement], now: DateTime<Utc>) -> Result<usize> {
        let mut tx = self.db.begin().await?;

        let mut shifted = 0;
        for movement in movements {
            if db::shift_bus(&mut tx, movement.bus_id, movement.delta, movement.flip, now).await? {
                shifted += 1;
            }
        }

        tx.commit().await?;
        Ok(shifted)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        let mut tx = self.db.begin().await?;
        Ok(db::count_buses(&mut tx).await? == 0)
    }

    /// Replaces all routes and buses with the given ones.
    #[instrument(skip_all, fields(routes = routes.len(), buses = buses.len()))]
    pub async fn replace_all(&self, routes: &[Route], buses: &[BusDetails]) -> Result<()> {
        let mut tx = self.db.begin().await?;

        db::purge(&mut tx).await?;

        for route in routes {
            db::route::store(&mut tx, route).await?;
        }

        for details in buses {
            db::store_bus(&mut tx, &details.bus).await?;

            for daily in &details.daily_locations {
                db::store_daily_location(&mut tx, details.bus.bus_id, daily).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use super::BusStore;
    use crate::bustrack::{db, Bus, BusDetails, BusId, BusStatus, DailyLocation, Location, Route, RouteId};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn bus(id: i64, route: i64, status: BusStatus, daily: Vec<DailyLocation>) -> BusDetails {
        BusDetails {
            bus: Bus {
                bus_id: BusId(id),
                route_id: RouteId(route),
                status,
                current_location: Location { latitude: 6.9319, longitude: 79.8478 },
                last_updated: at(1, 8),
            },
            daily_locations: daily,
        }
    }

    /// A store with two routes and three buses. Bus 10101 has snapshots on
    /// the 2nd and 3rd of March 2025.
    pub(crate) async fn seeded_store() -> Result<BusStore> {
        let store = BusStore::new(db::open_in_memory().await?);

        let routes = vec![
            Route { route_id: RouteId(101), route_name: "Colombo to Kandy".into() },
            Route { route_id: RouteId(102), route_name: "Colombo to Galle".into() },
        ];

        let buses = vec![
            bus(10102, 101, BusStatus::OnTime, vec![]),
            bus(10101, 101, BusStatus::OnTime, vec![
                DailyLocation {
                    date: at(2, 9),
                    location: Location { latitude: 7.0, longitude: 80.0 },
                    status: BusStatus::Delayed,
                },
                DailyLocation {
                    date: at(3, 9),
                    location: Location { latitude: 7.1, longitude: 80.1 },
                    status: BusStatus::OnTime,
                },
            ]),
            bus(10201, 102, BusStatus::Delayed, vec![]),
        ];

        store.replace_all(&routes, &buses).await?;
        Ok(store)
    }

    #[tokio::test]
    async fn list_buses() -> Result<()> {
        let store = seeded_store().await?;

        let ids: Vec<_> = store.buses(None).await?.iter().map(|bus| bus.bus_id.0).collect();
        assert_eq!(ids, vec![10101, 10102, 10201]);

        let ids: Vec<_> = store.buses(Some(RouteId(102))).await?.iter().map(|bus| bus.bus_id.0).collect();
        assert_eq!(ids, vec![10201]);

        assert!(store.buses(Some(RouteId(999))).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn buses_on_day_use_snapshots() -> Result<()> {
        let store = seeded_store().await?;

        let day = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let buses = store.buses_on(Some(RouteId(101)), day).await?;

        assert_eq!(buses.len(), 2);
        assert_eq!(buses[0].bus_id, BusId(10101));
        assert_eq!(buses[0].status, BusStatus::Delayed);
        assert_eq!(buses[0].current_location, Location { latitude: 7.0, longitude: 80.0 });
        assert_eq!(buses[0].last_updated, at(2, 9));

        // no snapshot, current state
        assert_eq!(buses[1].bus_id, BusId(10102));
        assert_eq!(buses[1].last_updated, at(1, 8));

        Ok(())
    }

    #[tokio::test]
    async fn bus_details() -> Result<()> {
        let store = seeded_store().await?;

        let details = store.bus_details(BusId(10101)).await?.unwrap();
        assert_eq!(details.bus.route_id, RouteId(101));
        assert_eq!(details.daily_locations.len(), 2);
        assert_eq!(details.daily_locations[1].date, at(3, 9));

        assert!(store.bus_details(BusId(1)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_bus() -> Result<()> {
        let store = seeded_store().await?;

        let location = Location { latitude: 8.0, longitude: 81.0 };
        let updated = store.move_bus(BusId(10201), location).await?;
        assert!(updated.is_some());

        let updated = store.set_status(BusId(10201), BusStatus::OnTime).await?;
        assert!(updated.is_some());

        let bus = store.bus(BusId(10201)).await?.unwrap();
        assert_eq!(bus.current_location, location);
        assert_eq!(bus.status, BusStatus::OnTime);
        assert_eq!(Some(bus.last_updated), updated);

        assert!(store.move_bus(BusId(1), location).await?.is_none());
        assert!(store.set_status(BusId(1), BusStatus::Delayed).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn replace_all_purges() -> Result<()> {
        let store = seeded_store().await?;
        assert!(!store.is_empty().await?);

        store.replace_all(&[], &[]).await?;
        assert!(store.is_empty().await?);
        assert!(store.routes().await?.is_empty());

        Ok(())
    }
}
