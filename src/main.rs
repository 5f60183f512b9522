use std::env;
use std::time::Duration;

use anyhow::Result;
use tokio::spawn;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bustrack_geo::{Catalog, GeoCache, Geocoder, Resolver};

use crate::bustrack::simulator;
use crate::bustrack::store::BusStore;

pub mod bustrack;
pub mod bustrack_web;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = env::var("BUSTRACK_CONFIG").unwrap_or_else(|_| "./bustrack.config.yaml".into());
    info!("Load config from {:?}", config_path);
    let config = bustrack::config::load(&config_path)?;

    info!("Open database at {}", config.database);
    let store = BusStore::new(bustrack::db::open(&config.database).await?);

    bustrack::seed::seed(&store, &config.seed).await?;

    let catalog = match Catalog::load(&config.geocode.cities) {
        Ok(catalog) => {
            info!("Loaded {} cities from {:?}", catalog.len(), config.geocode.cities);
            Some(catalog)
        }

        Err(err) => {
            error!("Failed to load cities, every lookup resolves to {:?}: {:?}", config.geocode.fallback, err);
            None
        }
    };

    let geocoder = Geocoder::new(
        Resolver::new(catalog, config.geocode.fallback.as_str()),
        GeoCache::new(config.geocode.cache_capacity, config.geocode.cache_ttl()),
    );

    let mut background = Vec::new();

    if let Some(interval) = config.simulation.interval_in_seconds {
        let options = simulator::Options {
            interval: Duration::from_secs(interval.get().into()),
            flip_probability: config.simulation.flip_probability,
            drift: config.simulation.drift,
        };

        let task = spawn(simulator::run(store.clone(), options));
        background.push(task.abort_handle());
    }

    bustrack_web::serve(bustrack_web::Options {
        operator_key: config.operator_api_key(),
        store,
        geocoder,
        static_dir: config.static_dir,
        addr: config.http_address,
        background,
    }).await?;

    Ok(())
}
