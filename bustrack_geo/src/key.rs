use std::fmt::{Display, Formatter};

use serde::Serialize;

/// A coordinate snapped to two decimal places (cells of roughly 1 km),
/// formatted as `"{lat},{lng}"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CellKey(String);

impl CellKey {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(format!("{},{}", round_cell(latitude), round_cell(longitude)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CellKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// rounds half up, the same way clients derive the key
fn round_cell(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}
