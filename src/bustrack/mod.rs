use anyhow::bail;
use chrono::{DateTime, Utc};
use derive_more::{Display, From, FromStr};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

pub mod config;
pub mod db;
pub mod schedule;
pub mod seed;
pub mod simulator;
pub mod store;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, FromStr)]
#[derive(Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct BusId(pub i64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, FromStr)]
#[derive(Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RouteId(pub i64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum BusStatus {
    OnTime,
    Delayed,
}

impl BusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusStatus::OnTime => "On Time",
            BusStatus::Delayed => "Delayed",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            BusStatus::OnTime => BusStatus::Delayed,
            BusStatus::Delayed => BusStatus::OnTime,
        }
    }
}

impl std::fmt::Display for BusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BusStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "On Time" => Ok(BusStatus::OnTime),
            "Delayed" => Ok(BusStatus::Delayed),
            value => bail!("unknown bus status {:?}", value),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// A bus and where it was seen last.
#[derive(Clone, Debug, Serialize)]
pub struct Bus {
    pub bus_id: BusId,
    pub route_id: RouteId,
    pub status: BusStatus,
    pub current_location: Location,
    pub last_updated: DateTime<Utc>,
}

/// A relative change of a bus, as applied by the simulator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Movement {
    pub bus_id: BusId,
    pub delta: Location,
    pub flip: bool,
}

/// A simulated snapshot of a bus for one calendar day.
#[derive(Clone, Debug, Serialize)]
pub struct DailyLocation {
    pub date: DateTime<Utc>,
    pub location: Location,
    pub status: BusStatus,
}

/// A bus together with its recorded daily snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct BusDetails {
    #[serde(flatten)]
    pub bus: Bus,

    #[serde(rename = "dailyLocations")]
    pub daily_locations: Vec<DailyLocation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Route {
    pub route_id: RouteId,
    pub route_name: String,
}

impl Route {
    /// Splits a name like "Colombo to Kandy" into its start and end city.
    pub fn cities(&self) -> (&str, &str) {
        let (start, end) = self.route_name
            .split_once(" to ")
            .unwrap_or(("", ""));

        let start = Some(start.trim()).filter(|s| !s.is_empty()).unwrap_or("Start");
        let end = Some(end.trim()).filter(|s| !s.is_empty()).unwrap_or("End");
        (start, end)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bus_status_roundtrip() -> anyhow::Result<()> {
        assert_eq!("On Time".parse::<BusStatus>()?, BusStatus::OnTime);
        assert_eq!(BusStatus::Delayed.to_string(), "Delayed");
        assert_eq!(serde_json::to_string(&BusStatus::OnTime)?, r#""On Time""#);
        assert!("late".parse::<BusStatus>().is_err());
        assert!(serde_json::from_str::<BusStatus>(r#""on time""#).is_err());
        Ok(())
    }

    #[test]
    fn route_cities() {
        let route = Route { route_id: RouteId(101), route_name: "Colombo to Kandy".into() };
        assert_eq!(route.cities(), ("Colombo", "Kandy"));

        let route = Route { route_id: RouteId(106), route_name: "Airport Express".into() };
        assert_eq!(route.cities(), ("Start", "End"));
    }
}
