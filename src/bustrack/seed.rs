use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::bustrack::config::{SeedConfig, SeedMode};
use crate::bustrack::store::BusStore;
use crate::bustrack::{Bus, BusDetails, BusId, BusStatus, DailyLocation, Location, Route, RouteId};

const ROUTES: [(i64, &str); 5] = [
    (101, "Colombo to Kandy"),
    (102, "Colombo to Galle"),
    (103, "Colombo to Jaffna"),
    (104, "Colombo to Anuradhapura"),
    (105, "Colombo to Matara"),
];

// all generated routes depart from Colombo Fort
const DEPARTURE: Location = Location { latitude: 6.9319, longitude: 79.8478 };

const BUSES_PER_ROUTE: i64 = 5;

/// Routes and buses to fill the database with.
pub struct Dataset {
    pub routes: Vec<Route>,
    pub buses: Vec<BusDetails>,
}

#[derive(Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub routes: Vec<SeedRoute>,

    #[serde(default)]
    pub buses: Vec<SeedBus>,
}

#[derive(Deserialize)]
pub struct SeedRoute {
    pub route_id: RouteId,

    #[serde(alias = "name")]
    pub route_name: String,
}

#[derive(Deserialize)]
pub struct SeedBus {
    pub bus_id: BusId,
    pub route_id: RouteId,

    #[serde(default)]
    pub status: Option<BusStatus>,

    #[serde(default)]
    pub current_location: Option<Location>,

    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default, rename = "dailyLocations")]
    pub daily_locations: Vec<SeedDailyLocation>,
}

#[derive(Deserialize)]
pub struct SeedDailyLocation {
    pub date: DateTime<Utc>,
    pub location: Location,
    pub status: BusStatus,
}

impl SeedFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fp = File::open(path).with_context(|| format!("open seed file {:?}", path))?;
        let seed = serde_json::from_reader(BufReader::new(fp)).with_context(|| format!("parse seed file {:?}", path))?;
        Ok(seed)
    }

    /// Builds the dataset. A bus without a current status or location takes
    /// the one of its first daily snapshot.
    pub fn into_dataset(self, now: DateTime<Utc>) -> Result<Dataset> {
        let routes = self.routes.into_iter()
            .map(|route| Route { route_id: route.route_id, route_name: route.route_name })
            .collect();

        let buses = self.buses.into_iter()
            .map(|bus| {
                let daily_locations: Vec<DailyLocation> = bus.daily_locations.into_iter()
                    .map(|daily| DailyLocation {
                        date: daily.date,
                        location: daily.location,
                        status: daily.status,
                    })
                    .collect();

                let first = daily_locations.first();

                let current_location = bus.current_location
                    .or_else(|| first.map(|daily| daily.location))
                    .ok_or_else(|| anyhow!("bus {} has no location", bus.bus_id))?;

                let status = bus.status
                    .or_else(|| first.map(|daily| daily.status))
                    .unwrap_or(BusStatus::OnTime);

                let bus = Bus {
                    bus_id: bus.bus_id,
                    route_id: bus.route_id,
                    status,
                    current_location,
                    last_updated: bus.last_updated.unwrap_or(now),
                };

                Ok(BusDetails { bus, daily_locations })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Dataset { routes, buses })
    }
}

/// Generates five routes out of Colombo with five buses each. Every bus gets
/// one snapshot per day for `days` days starting `now`, scattered around the
/// departure point.
pub fn generate(rng: &mut impl Rng, now: DateTime<Utc>, days: u32) -> Dataset {
    let routes = ROUTES.iter()
        .map(|&(id, name)| Route { route_id: RouteId(id), route_name: name.to_owned() })
        .collect();

    let mut buses = Vec::new();

    for (route_id, _) in ROUTES {
        for idx in 1..=BUSES_PER_ROUTE {
            let daily_locations: Vec<DailyLocation> = (0..days)
                .map(|day| DailyLocation {
                    date: now + Duration::days(day.into()),
                    location: Location {
                        latitude: DEPARTURE.latitude + (rng.gen::<f64>() - 0.5) * 0.05,
                        longitude: DEPARTURE.longitude + (rng.gen::<f64>() - 0.5) * 0.05,
                    },
                    status: if rng.gen_bool(0.8) { BusStatus::OnTime } else { BusStatus::Delayed },
                })
                .collect();

            let (status, current_location) = daily_locations.first()
                .map(|daily| (daily.status, daily.location))
                .unwrap_or((BusStatus::OnTime, DEPARTURE));

            let bus = Bus {
                bus_id: BusId(route_id * 100 + idx),
                route_id: RouteId(route_id),
                status,
                current_location,
                last_updated: now,
            };

            buses.push(BusDetails { bus, daily_locations });
        }
    }

    Dataset { routes, buses }
}

/// Fills the database according to the seed mode.
#[instrument(skip_all)]
pub async fn seed(store: &BusStore, config: &SeedConfig) -> Result<()> {
    match config.mode {
        SeedMode::Never => return Ok(()),

        SeedMode::IfEmpty if !store.is_empty().await? => {
            info!("Database already contains buses, not seeding");
            return Ok(());
        }

        _ => (),
    }

    let now = Utc::now();

    let dataset = match &config.file {
        Some(path) => {
            info!("Seed database from {:?}", path);
            SeedFile::load(path)?.into_dataset(now)?
        }

        None => {
            info!("Seed database with generated data for {} days", config.days);
            generate(&mut StdRng::from_entropy(), now, config.days)
        }
    };

    store.replace_all(&dataset.routes, &dataset.buses).await?;

    info!("Seeded {} routes and {} buses", dataset.routes.len(), dataset.buses.len());
    Ok(())
}
