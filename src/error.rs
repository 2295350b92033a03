use std::fmt;

/// Error taxonomy for the engine.
///
/// Empty matching pools, ticks with no treatments and similar expected
/// empty results are *not* errors; they are `Option`/empty-collection
/// returns. `NgError` covers the conditions a run cannot continue from.
#[derive(Debug)]
pub enum NgError {
    /// A probability table or distribution parameter failed validation.
    /// Surfaced before the first tick runs; the engine never attempts
    /// partial recovery mid-run.
    Parameter(String),
    /// A structural invariant of the registry or partnership graph was
    /// violated. Fatal: a corrupted graph compounds nonsensically over
    /// thousands of ticks.
    Invariant(String),
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
}

impl NgError {
    pub fn parameter(msg: impl Into<String>) -> Self {
        NgError::Parameter(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        NgError::Invariant(msg.into())
    }
}

impl fmt::Display for NgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NgError::Parameter(msg) => write!(f, "parameter error: {msg}"),
            NgError::Invariant(msg) => write!(f, "invariant violation: {msg}"),
            NgError::Io(err) => write!(f, "io error: {err}"),
            NgError::Csv(err) => write!(f, "csv error: {err}"),
            NgError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for NgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NgError::Io(err) => Some(err),
            NgError::Csv(err) => Some(err),
            NgError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NgError {
    fn from(err: std::io::Error) -> Self {
        NgError::Io(err)
    }
}

impl From<csv::Error> for NgError {
    fn from(err: csv::Error) -> Self {
        NgError::Csv(err)
    }
}

impl From<serde_json::Error> for NgError {
    fn from(err: serde_json::Error) -> Self {
        NgError::Json(err)
    }
}
