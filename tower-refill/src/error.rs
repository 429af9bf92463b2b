/// Errors produced by the refill-limit middleware stack.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefillError {
    /// The request waited for a permit longer than the configured timeout.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out waiting for a permit")]
    Timeout,

    /// The request was refused without waiting: either fail-fast mode found no permit, or the
    /// limiter's hint lay beyond the remaining timeout.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// Hint from the limiter of when a permit could next be available.
        retry_after: std::time::Duration,
    },

    /// The inner service failed. Holds the `Display` form of its error.
    ///
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal service error: {0}")]
    Inner(String),
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RefillError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Inner(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, self.to_string()).into_response();
        if let Self::RateLimited { retry_after } = self {
            // Retry-After is whole seconds; never advertise zero.
            let secs = retry_after.as_secs().max(1);
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(secs),
            );
        }
        response
    }
}
