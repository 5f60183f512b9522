use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::bustrack::store::BusStore;
use crate::bustrack::{BusId, Location, Movement};

#[derive(Clone, Copy, Debug)]
pub struct Options {
    pub interval: Duration,
    pub flip_probability: f64,

    // maximum movement per tick in degrees
    pub drift: f64,
}

/// Draws a random offset for the bus and whether its status flips.
pub fn step(bus_id: BusId, rng: &mut impl Rng, options: &Options) -> Movement {
    let drift = options.drift.abs();

    Movement {
        bus_id,
        delta: Location {
            latitude: rng.gen_range(-drift..=drift),
            longitude: rng.gen_range(-drift..=drift),
        },
        flip: rng.gen_bool(options.flip_probability),
    }
}

/// Runs one simulation step for every bus. Returns the number of buses updated.
#[instrument(skip_all)]
pub async fn tick(store: &BusStore, rng: &mut impl Rng, options: &Options) -> Result<usize> {
    let movements = store.buses(None).await?
        .into_iter()
        .map(|bus| step(bus.bus_id, rng, options))
        .collect_vec();

    let shifted = store.shift(&movements, Utc::now()).await?;

    debug!("Simulated {} buses", shifted);
    Ok(shifted)
}

/// Ticks forever. A failed tick is logged and the next one proceeds as usual.
pub async fn run(store: BusStore, options: Options) {
    info!("Simulating bus movement every {:?}", options.interval);

    let mut rng = StdRng::from_entropy();

    let mut interval = tokio::time::interval(options.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        if let Err(err) = tick(&store, &mut rng, &options).await {
            warn!("Simulation tick failed: {:?}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::bustrack::store::test::seeded_store;
    use crate::bustrack::BusStatus;

    fn options(flip_probability: f64) -> Options {
        Options {
            interval: Duration::from_secs(5),
            flip_probability,
            drift: 0.005,
        }
    }

    #[test]
    fn step_stays_within_drift() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let movement = step(BusId(10101), &mut rng, &options(0.0));

            assert_eq!(movement.bus_id, BusId(10101));
            assert!(movement.delta.latitude.abs() <= 0.005 + 1e-9);
            assert!(movement.delta.longitude.abs() <= 0.005 + 1e-9);
            assert!(!movement.flip);
        }
    }

    #[tokio::test]
    async fn tick_updates_all_buses() -> Result<()> {
        let store = seeded_store().await?;
        let before = store.buses(None).await?;

        let mut rng = StdRng::seed_from_u64(1);
        let updated = tick(&store, &mut rng, &options(1.0)).await?;
        assert_eq!(updated, before.len());

        let after = store.buses(None).await?;
        for (before, after) in before.iter().zip(&after) {
            assert_eq!(before.bus_id, after.bus_id);
            assert_eq!(after.status, before.status.flipped());
            assert!(after.last_updated > before.last_updated);
            assert!((after.current_location.latitude - before.current_location.latitude).abs() <= 0.005 + 1e-9);
        }

        Ok(())
    }

    #[tokio::test]
    async fn operator_update_survives_tick() -> Result<()> {
        let store = seeded_store().await?;

        // movements are drawn from the buses as read before the update
        let mut rng = StdRng::seed_from_u64(5);
        let movements = store.buses(None).await?
            .into_iter()
            .map(|bus| step(bus.bus_id, &mut rng, &options(1.0)))
            .collect_vec();

        let patched = Location { latitude: 8.0, longitude: 81.0 };
        store.move_bus(BusId(10201), patched).await?;
        store.set_status(BusId(10201), BusStatus::OnTime).await?;

        store.shift(&movements, Utc::now()).await?;

        let movement = movements.iter().find(|movement| movement.bus_id == BusId(10201)).unwrap();
        let bus = store.bus(BusId(10201)).await?.unwrap();

        assert!((bus.current_location.latitude - (patched.latitude + movement.delta.latitude)).abs() < 1e-9);
        assert!((bus.current_location.longitude - (patched.longitude + movement.delta.longitude)).abs() < 1e-9);

        // flipped from the updated status, not the one read before
        assert_eq!(bus.status, BusStatus::Delayed);

        Ok(())
    }

    #[tokio::test]
    async fn shift_skips_missing_buses() -> Result<()> {
        let store = seeded_store().await?;

        let movement = Movement {
            bus_id: BusId(1),
            delta: Location { latitude: 0.001, longitude: 0.001 },
            flip: true,
        };

        assert_eq!(store.shift(&[movement], Utc::now()).await?, 0);
        Ok(())
    }
}
