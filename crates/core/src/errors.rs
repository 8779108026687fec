use thiserror::Error;

/// Unified error type for the entire ledgerlens-core library.
/// Every public fallible function returns `Result<T, CoreError>`.
///
/// Feed and resolution failures are deliberately absorbed at the component
/// boundaries: `PriceService`, `TickerResolver` and `ValuationService`
/// degrade to sentinel values (`None`, empty series) instead of returning
/// errors, so a flaky market-data feed can never take down a caller.
/// `CoreError` carries what remains: storage, configuration, and the
/// feed-layer errors before they are absorbed.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage ─────────────────────────────────────────────────────
    #[error("Store I/O error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("Feed error ({provider}): {message}")]
    Feed {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No price data for {ticker}")]
    NoData { ticker: String },

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // Sanitize error message: strip query parameters from URLs so
        // search terms never leak into log output.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
