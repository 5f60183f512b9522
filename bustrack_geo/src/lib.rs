use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use arcstr::ArcStr;
use ordered_float::OrderedFloat;
use serde::Deserialize;

mod cache;
mod geocoder;
mod key;

pub use cache::GeoCache;
pub use geocoder::{BatchResults, Geocoder, Resolved, Resolver, MAX_BATCH_SIZE};
pub use key::CellKey;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone, Debug, Deserialize)]
pub struct City {
    pub name: ArcStr,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl City {
    pub fn new(name: impl Into<ArcStr>, latitude: f64, longitude: f64) -> Self {
        Self { name: name.into(), latitude, longitude }
    }
}

/// The reference points a coordinate can resolve to, kept in file order.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    cities: Vec<City>,
}

impl Catalog {
    pub fn new(cities: Vec<City>) -> Self {
        Self { cities }
    }

    /// Reads a json list of `{name, lat, lng}` records.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let fp = File::open(path)
            .with_context(|| format!("open city catalog {:?}", path))?;

        let cities: Vec<City> = serde_json::from_reader(BufReader::new(fp))
            .with_context(|| format!("parse city catalog {:?}", path))?;

        Ok(Self::new(cities))
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Returns the city closest to the given point. On equal distance the
    /// city listed first wins.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&City> {
        self.cities
            .iter()
            .min_by_key(|&city| OrderedFloat(distance_km(latitude, longitude, city.latitude, city.longitude)))
    }
}

/// Great-circle distance in kilometers using the haversine formula.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}
