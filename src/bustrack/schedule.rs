use std::num::IntErrorKind;

use itertools::Itertools;
use serde::Serialize;

use crate::bustrack::{BusId, Route, RouteId};

#[derive(Clone, Debug, Serialize)]
pub struct Trip {
    pub bus_id: BusId,
    pub route_id: RouteId,
    pub start_time: String,
    pub start_city: String,
    pub end_city: String,
}

const MINUTES_PER_DAY: u32 = 24 * 60;

/// The part of a day in which trips depart, in minutes since midnight.
/// Both ends lie within the same day, so a window holds at most one
/// departure per minute of the day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    start: u32,
    end: u32,
}

impl Window {
    /// Returns None unless `end` is after `start` and before midnight.
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (end > start && end < MINUTES_PER_DAY).then_some(Self { start, end })
    }

    /// Parses two `HH:mm` values. Parts that are not numbers count as zero,
    /// hours past 23 or minutes past 59 are rejected.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Self::new(minutes_of_day(start)?, minutes_of_day(end)?)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self { start: 5 * 60, end: 22 * 60 }
    }
}

/// Departures of a route every `headway` minutes within the window, ordered
/// by start time and bus. The buses take turns in the given order.
pub fn trips(route: &Route, buses: &[BusId], window: Window, headway: u32) -> Vec<Trip> {
    let (start_city, end_city) = route.cities();

    (window.start..=window.end)
        .step_by(headway.max(1) as usize)
        .zip(buses.iter().cycle())
        .map(|(minutes, &bus_id)| Trip {
            bus_id,
            route_id: route.route_id,
            start_time: format!("{:02}:{:02}", minutes / 60, minutes % 60),
            start_city: start_city.to_owned(),
            end_city: end_city.to_owned(),
        })
        .sorted_by(|lhs, rhs| lhs.start_time.cmp(&rhs.start_time).then(lhs.bus_id.cmp(&rhs.bus_id)))
        .collect_vec()
}

fn minutes_of_day(value: &str) -> Option<u32> {
    let mut parts = value.trim().splitn(2, ':').map(clock_part);

    let hours = parts.next().unwrap_or(Some(0))?;
    let minutes = parts.next().unwrap_or(Some(0))?;

    (hours < 24 && minutes < 60).then_some(hours * 60 + minutes)
}

// non-numeric text reads as zero, a number too large for u32 is rejected
fn clock_part(part: &str) -> Option<u32> {
    match part.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => None,
        Err(_) => Some(0),
    }
}
