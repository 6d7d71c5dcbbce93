//! HTTP middleware (CORS)

use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins allowed to call the API with credentials.
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    origins: Vec<String>,
}

impl AllowedOrigins {
    /// The public origin plus the local dev frontend.
    pub fn new(public_origin: &str) -> Self {
        Self {
            origins: vec![
                public_origin.to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }

    fn as_header_values(&self) -> Vec<HeaderValue> {
        self.origins.iter().filter_map(|o| o.parse().ok()).collect()
    }
}

/// Create the CORS layer.
pub fn cors(allowed: &AllowedOrigins) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed.as_header_values()))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_and_dev_origins_are_allowed() {
        let allowed = AllowedOrigins::new("https://transmitter.test");
        let values = allowed.as_header_values();
        assert!(values.contains(&HeaderValue::from_static("https://transmitter.test")));
        assert!(values.contains(&HeaderValue::from_static("http://localhost:5173")));
    }
}
