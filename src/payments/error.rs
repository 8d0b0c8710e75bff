use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request never left the process: bad amount, missing key...
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(timeout)
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }

    /// Whether retrying later (poll or webhook) could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}
