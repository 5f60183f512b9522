use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::Router;
use bustrack_geo::{Catalog, City, GeoCache, Geocoder, Resolver};
use serde_json::Value;
use tower::ServiceExt;

use crate::bustrack::store::test::seeded_store;
use crate::bustrack_web::auth::API_KEY_HEADER;
use crate::bustrack_web::{router, AppState};

pub const API_KEY: &str = "secret-operator-key";

/// The router on top of the seeded test store and a two city catalog.
pub struct TestApp {
    pub geocoder: Geocoder,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_key(Some(API_KEY)).await
    }

    pub async fn without_api_key() -> Result<Self> {
        Self::with_key(None).await
    }

    async fn with_key(key: Option<&str>) -> Result<Self> {
        let catalog = Catalog::new(vec![
            City::new("Colombo", 6.9271, 79.8612),
            City::new("Kandy", 7.2906, 80.6337),
        ]);

        let cache = GeoCache::new(NonZeroUsize::new(100).unwrap(), Duration::from_secs(60));
        let geocoder = Geocoder::new(Resolver::new(Some(catalog), "Sri Lanka"), cache);

        let state = AppState {
            store: seeded_store().await?,
            geocoder: geocoder.clone(),
            operator_key: key.map(Arc::from),
        };

        Ok(Self { geocoder, router: router(state, None) })
    }

    /// Sends the request and decodes the json response body.
    pub async fn call(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }
}

pub fn get(uri: &str) -> Result<Request<Body>> {
    Ok(Request::get(uri).body(Body::empty())?)
}

pub fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;

    Ok(request)
}

pub fn patch_json(uri: &str, body: &Value, key: Option<&str>) -> Result<Request<Body>> {
    let mut request = Request::patch(uri).header(CONTENT_TYPE, "application/json");

    if let Some(key) = key {
        request = request.header(API_KEY_HEADER, key);
    }

    Ok(request.body(Body::from(body.to_string()))?)
}
