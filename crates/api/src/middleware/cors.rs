//! CORS policy: the dev origin and the production frontend, with credentials
//! so the refresh-token cookie travels.

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ApiConfig;

/// Origins allowed to call the API from a browser.
#[must_use]
pub fn allowed_origins(config: &ApiConfig) -> Vec<HeaderValue> {
    let frontend = config.frontend_url.origin().ascii_serialization();
    let mut origins: Vec<HeaderValue> = [config.dev_origin.as_str(), frontend.as_str()]
        .into_iter()
        .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
        .collect();
    origins.dedup();
    origins
}

/// Build the CORS layer.
#[must_use]
pub fn cors_layer(config: &ApiConfig) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(config)))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static("baggage"),
            HeaderName::from_static("sentry-trace"),
        ])
}
