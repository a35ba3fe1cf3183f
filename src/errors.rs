use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure reported to whoever asked for a song.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SongError {
    /// Nothing could interpret the reference, or extraction came back empty.
    #[error("unsupported")]
    Unsupported,

    /// An external data source could not be reached or answered with an error.
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),
}

impl From<AppError> for SongError {
    fn from(error: AppError) -> Self {
        SongError::ResolutionFailed(error.to_string())
    }
}

/// Failure raised inside an extraction back-end. These never leave the
/// extraction worker; the worker logs them and answers "no data".
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("extraction returned no data")]
    Empty,

    #[error("unsupported query: {0}")]
    Unsupported(String),

    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("extractor process failed: {0}")]
    Process(String),

    #[error("could not parse extractor output: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn song_error_messages() {
        assert_eq!(SongError::Unsupported.to_string(), "unsupported");
        assert_eq!(
            SongError::ResolutionFailed("503".to_string()).to_string(),
            "resolution failed: 503"
        );
    }

    #[test]
    fn app_error_becomes_resolution_failure() {
        let error: SongError = AppError::Api("token rejected".to_string()).into();
        assert_eq!(
            error,
            SongError::ResolutionFailed("API error: token rejected".to_string())
        );
    }
}
