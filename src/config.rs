use std::env;

use crate::error::{ReportError, ReportResult};

/// Immutable run configuration, read once at startup and passed by
/// reference into each pipeline stage.
#[derive(Debug, Clone)]
pub struct Config {
    pub qualtrics_api_key: String,
    pub qualtrics_base_url: String,
    pub survey_id: String,
    pub questions: Vec<String>,
    pub id_column: String,
    pub max_appendix_rows: usize,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub smtp_host: String,
    pub smtp_sender: String,
    pub smtp_password: String,
    pub smtp_timeout_secs: u64,
    pub recipients: Vec<String>,
    pub report_title: String,
    pub output_dir: String,
}

impl Config {
    pub fn from_env() -> ReportResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            qualtrics_api_key: required("QUALTRICS_API_KEY")?,
            qualtrics_base_url: required("QUALTRICS_BASE_URL")?,
            survey_id: required("SURVEY_ID")?,
            questions: split_list(
                &env::var("SURVEY_QUESTIONS").unwrap_or_else(|_| "Q1,Q2,Q3".to_string()),
            ),
            id_column: env::var("ID_COLUMN").unwrap_or_else(|_| "ResponseId".to_string()),
            max_appendix_rows: parse_var("MAX_APPENDIX_ROWS", 25)?,
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:1234".to_string()),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "Meta-Llama-3-8B-Instruct-Q5_K_M.gguf".to_string()),
            llm_timeout_secs: parse_var("LLM_TIMEOUT_SECS", 300)?,
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            smtp_sender: required("SMTP_SENDER")?,
            smtp_password: required("SMTP_PASSWORD")?,
            smtp_timeout_secs: parse_var("SMTP_TIMEOUT_SECS", 60)?,
            recipients: split_list(&required("REPORT_RECIPIENTS")?),
            report_title: env::var("REPORT_TITLE")
                .unwrap_or_else(|_| "Daily Feedback Thematic Analysis".to_string()),
            output_dir: env::var("OUTPUT_DIR").unwrap_or_else(|_| ".".to_string()),
        })
    }
}

fn required(name: &str) -> ReportResult<String> {
    env::var(name).map_err(|_| ReportError::Config(format!("{name} must be set")))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> ReportResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ReportError::Config(format!("{name} must be a number"))),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empties() {
        assert_eq!(
            split_list(" Q1, Q2 ,,Q3 "),
            vec!["Q1".to_string(), "Q2".to_string(), "Q3".to_string()]
        );
    }

    #[test]
    fn test_split_list_single_entry() {
        assert_eq!(
            split_list("facilitator@example.edu"),
            vec!["facilitator@example.edu".to_string()]
        );
    }

    #[test]
    fn test_split_list_empty_input() {
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_required_missing_names_the_variable() {
        let err = required("DEFINITELY_NOT_SET_VAR_12345").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config error: DEFINITELY_NOT_SET_VAR_12345 must be set"
        );
        assert_eq!(err.stage(), "config");
    }
}
