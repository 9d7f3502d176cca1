use thiserror::Error;

/// Pipeline failure kinds, one per stage that can fail.
///
/// `Fetch`, `Conversion`, `Delivery` and `Config` are fatal: the run stops
/// with a stage-labeled diagnostic and nothing is sent. `Analysis` is
/// recoverable at the pipeline level (placeholder section, run continues).
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Delivery error: {0}")]
    Delivery(String),
}

impl ReportError {
    /// Stage label used in fatal diagnostics and exit messages.
    pub fn stage(&self) -> &'static str {
        match self {
            ReportError::Config(_) => "config",
            ReportError::Fetch(_) => "fetch",
            ReportError::Analysis(_) => "analyze",
            ReportError::Conversion(_) => "convert",
            ReportError::Delivery(_) => "send",
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReportError::Analysis(_))
    }
}

pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ReportError::Config("QUALTRICS_API_KEY must be set".to_string());
        assert_eq!(
            error.to_string(),
            "Config error: QUALTRICS_API_KEY must be set"
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let error = ReportError::Fetch("survey SV_123 not found".to_string());
        assert_eq!(error.to_string(), "Fetch error: survey SV_123 not found");
    }

    #[test]
    fn test_analysis_error_display() {
        let error = ReportError::Analysis("inference endpoint unreachable".to_string());
        assert_eq!(
            error.to_string(),
            "Analysis error: inference endpoint unreachable"
        );
    }

    #[test]
    fn test_stage_labels() {
        let cases = vec![
            (ReportError::Config("x".to_string()), "config"),
            (ReportError::Fetch("x".to_string()), "fetch"),
            (ReportError::Analysis("x".to_string()), "analyze"),
            (ReportError::Conversion("x".to_string()), "convert"),
            (ReportError::Delivery("x".to_string()), "send"),
        ];
        for (error, expected) in cases {
            assert_eq!(error.stage(), expected);
        }
    }

    #[test]
    fn test_fatality() {
        assert!(ReportError::Fetch("x".to_string()).is_fatal());
        assert!(ReportError::Conversion("x".to_string()).is_fatal());
        assert!(ReportError::Delivery("x".to_string()).is_fatal());
        assert!(ReportError::Config("x".to_string()).is_fatal());
        assert!(!ReportError::Analysis("x".to_string()).is_fatal());
    }

    #[test]
    fn test_report_result_ok() {
        fn returns_ok() -> ReportResult<i32> {
            Ok(42)
        }
        assert_eq!(returns_ok().unwrap(), 42);
    }
}
