//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID
//! 4. Security headers
//! 5. CORS
//! 6. Rate limiting on `/api` (governor), stricter on credential endpoints
//!
//! Authentication is an extractor ([`RequireAuth`]), not a layer.

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{AuthRejection, RequireAuth};
pub use cors::cors_layer;
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::{RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
