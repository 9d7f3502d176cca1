use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod llm;
mod pipeline;
mod qualtrics;

use config::Config;
use error::ReportResult;
use llm::openai::OpenAIProvider;
use qualtrics::QualtricsClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(stage = err.stage(), "{err}");
        std::process::exit(1);
    }
}

async fn run() -> ReportResult<()> {
    let config = Config::from_env()?;

    tracing::info!(
        survey_id = %config.survey_id,
        questions = config.questions.len(),
        model = %config.llm_model,
        "Starting survey-report run"
    );

    let provider: Arc<dyn llm::Provider> = Arc::new(OpenAIProvider::new_local(&config.llm_base_url));
    let llm_client = llm::LlmClient::new(provider, Duration::from_secs(config.llm_timeout_secs));
    let qualtrics = QualtricsClient::new(&config.qualtrics_base_url, &config.qualtrics_api_key)?;

    let outcome = pipeline::orchestrator::run(&config, &llm_client, &qualtrics).await?;

    if outcome.summary_missing {
        tracing::warn!("report was sent without an executive summary");
    }
    if outcome.failed_questions.is_empty() {
        tracing::info!(
            report = %outcome.docx_path.display(),
            "run complete, all question analyses succeeded"
        );
    } else {
        tracing::warn!(
            report = %outcome.docx_path.display(),
            failed = outcome.failed_questions.join(", "),
            "run complete with failed question analyses"
        );
    }

    Ok(())
}
