use std::sync::Arc;

use arcstr::ArcStr;
use itertools::Itertools;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{Catalog, CellKey, GeoCache};

/// Upper bound of coordinates looked at in a single batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Resolves a coordinate to the closest catalog city, or to the fallback
/// label if there is no catalog to search.
pub struct Resolver {
    catalog: Option<Catalog>,
    fallback: ArcStr,
}

impl Resolver {
    pub fn new(catalog: Option<Catalog>, fallback: impl Into<ArcStr>) -> Self {
        Self { catalog, fallback: fallback.into() }
    }

    pub fn resolve(&self, latitude: f64, longitude: f64) -> ArcStr {
        match self.catalog.as_ref().and_then(|catalog| catalog.nearest(latitude, longitude)) {
            Some(city) => city.name.clone(),
            None => self.fallback.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Resolved {
    pub key: CellKey,
    pub place: ArcStr,
}

/// Place names per cell, in the order the cells first appeared in the request.
#[derive(Debug, Default)]
pub struct BatchResults(Vec<(CellKey, ArcStr)>);

impl BatchResults {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ArcStr> {
        self.0.iter()
            .find(|(cell, _)| cell.as_str() == key)
            .map(|(_, place)| place)
    }

    pub fn iter(&self) -> impl Iterator<Item=(&CellKey, &ArcStr)> {
        self.0.iter().map(|(key, place)| (key, place))
    }
}

impl Serialize for BatchResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Reverse geocoder combining the resolver with a shared cache.
#[derive(Clone)]
pub struct Geocoder {
    resolver: Arc<Resolver>,
    cache: Arc<GeoCache>,
}

impl Geocoder {
    pub fn new(resolver: Resolver, cache: GeoCache) -> Self {
        Self {
            resolver: Arc::new(resolver),
            cache: Arc::new(cache),
        }
    }

    pub fn reverse(&self, latitude: f64, longitude: f64) -> Resolved {
        let key = CellKey::new(latitude, longitude);
        let place = self.lookup(&key, latitude, longitude);
        Resolved { key, place }
    }

    /// Resolves each distinct cell of the given coordinates once. Only the
    /// first [MAX_BATCH_SIZE] entries are considered; a `None` entry marks a
    /// coordinate that failed validation and still counts against that limit.
    pub fn reverse_batch<I>(&self, coords: I) -> BatchResults
    where
        I: IntoIterator<Item=Option<(f64, f64)>>,
    {
        let cells = coords.into_iter()
            .take(MAX_BATCH_SIZE)
            .flatten()
            .map(|(latitude, longitude)| (CellKey::new(latitude, longitude), latitude, longitude))
            .unique_by(|(key, _, _)| key.clone())
            .collect_vec();

        debug!("Resolve batch of {} distinct cells", cells.len());

        let results = cells.into_iter()
            .map(|(key, latitude, longitude)| {
                let place = self.lookup(&key, latitude, longitude);
                (key, place)
            })
            .collect_vec();

        BatchResults(results)
    }

    /// Number of entries currently held in the cache.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn lookup(&self, key: &CellKey, latitude: f64, longitude: f64) -> ArcStr {
        if let Some(place) = self.cache.get(key) {
            return place;
        }

        let place = self.resolver.resolve(latitude, longitude);
        self.cache.insert(key.clone(), place.clone());
        place
    }
}

#[cfg(test)]
mod test {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use crate::{Catalog, City, GeoCache, Geocoder, Resolver, MAX_BATCH_SIZE};

    fn catalog() -> Catalog {
        Catalog::new(vec![
            City::new("Colombo", 6.9271, 79.8612),
            City::new("Kandy", 7.2906, 80.6337),
        ])
    }

    fn geocoder(catalog: Option<Catalog>) -> Geocoder {
        let cache = GeoCache::new(NonZeroUsize::new(5000).unwrap(), Duration::from_secs(60));
        Geocoder::new(Resolver::new(catalog, "Sri Lanka"), cache)
    }

    #[test]
    fn resolve_nearest() {
        let resolver = Resolver::new(Some(catalog()), "Sri Lanka");
        assert_eq!(resolver.resolve(6.93, 79.86).as_str(), "Colombo");
        assert_eq!(resolver.resolve(7.29, 80.63).as_str(), "Kandy");

        // same input, same answer
        assert_eq!(resolver.resolve(7.0, 80.2), resolver.resolve(7.0, 80.2));
    }

    #[test]
    fn resolve_falls_back_without_catalog() {
        let resolver = Resolver::new(None, "Sri Lanka");
        assert_eq!(resolver.resolve(6.93, 79.86).as_str(), "Sri Lanka");

        let resolver = Resolver::new(Some(Catalog::default()), "Sri Lanka");
        assert_eq!(resolver.resolve(f64::NAN, 1000.0).as_str(), "Sri Lanka");
    }

    #[test]
    fn reverse_caches_by_cell() {
        let geocoder = geocoder(Some(catalog()));

        let first = geocoder.reverse(6.9301, 79.8601);
        assert_eq!(first.key.as_str(), "6.93,79.86");
        assert_eq!(first.place.as_str(), "Colombo");
        assert_eq!(geocoder.cached(), 1);

        // a different point within the same cell is answered from the cache
        let second = geocoder.reverse(6.9349, 79.8649);
        assert_eq!(second.key, first.key);
        assert_eq!(second.place, first.place);
        assert_eq!(geocoder.cached(), 1);
    }

    #[test]
    fn batch_deduplicates_cells() {
        let geocoder = geocoder(Some(catalog()));

        let results = geocoder.reverse_batch(vec![
            Some((6.9301, 79.8601)),
            None,
            Some((7.29, 80.63)),
            Some((6.9349, 79.8649)),
        ]);

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("6.93,79.86").map(|p| p.as_str()), Some("Colombo"));
        assert_eq!(results.get("7.29,80.63").map(|p| p.as_str()), Some("Kandy"));
        assert_eq!(geocoder.cached(), 2);

        let json = serde_json::to_string(&results).unwrap();
        assert_eq!(json, r#"{"6.93,79.86":"Colombo","7.29,80.63":"Kandy"}"#);
    }

    #[test]
    fn batch_is_truncated() {
        let geocoder = geocoder(Some(catalog()));

        // distinct integer coordinates, each its own cell
        let coords = (0..MAX_BATCH_SIZE + 50)
            .map(|idx| Some(((idx / 100) as f64, (idx % 100) as f64)));

        let results = geocoder.reverse_batch(coords);
        assert_eq!(results.len(), MAX_BATCH_SIZE);
        assert!(results.get("10,0").is_none());
    }

    #[test]
    fn invalid_entries_count_against_the_limit() {
        let geocoder = geocoder(Some(catalog()));

        let coords = std::iter::repeat(None)
            .take(MAX_BATCH_SIZE)
            .chain(std::iter::once(Some((6.93, 79.86))));

        assert!(geocoder.reverse_batch(coords).is_empty());
        assert_eq!(geocoder.cached(), 0);
    }
}
