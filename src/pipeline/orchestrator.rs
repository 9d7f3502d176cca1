use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::config::Config;
use crate::error::ReportResult;
use crate::llm::LlmClient;
use crate::qualtrics::QualtricsClient;

use super::analyze::SectionOutcome;
use super::assemble::AssembleParams;
use super::{analyze, assemble, convert, fetch, send, synthesize};

/// What a completed run leaves behind, reported to the operator at exit.
#[derive(Debug)]
pub struct RunOutcome {
    pub docx_path: PathBuf,
    pub failed_questions: Vec<String>,
    pub summary_missing: bool,
}

/// Runs the whole pipeline: fetch, analyze, synthesize, assemble, convert,
/// send. Strictly sequential; each stage consumes the previous stage's
/// output. Fatal errors propagate immediately; per-question analysis
/// failures degrade to placeholders and are collected into the outcome.
#[tracing::instrument(name = "pipeline report", skip_all, fields(survey.id = %config.survey_id))]
pub async fn run(
    config: &Config,
    llm_client: &LlmClient,
    qualtrics: &QualtricsClient,
) -> ReportResult<RunOutcome> {
    let data = fetch::fetch(qualtrics, config).await?;

    let sections = analyze::analyze_all(llm_client, &config.llm_model, &data.questions).await;

    let executive_summary = synthesize::synthesize(llm_client, &config.llm_model, &sections).await;

    let generated_at = chrono::Local::now().naive_local();
    let markdown = assemble::assemble(&AssembleParams {
        title: &config.report_title,
        survey_id: &config.survey_id,
        model: &config.llm_model,
        generated_at,
        executive_summary: executive_summary.as_deref(),
        sections: &sections,
        raw_rows: &data.raw_rows,
        question_ids: &config.questions,
        id_column: &config.id_column,
        max_appendix_rows: config.max_appendix_rows,
    });

    let docx_path = docx_path(&config.output_dir, generated_at);
    convert::convert(&markdown, &docx_path).await?;

    let failed_questions: Vec<String> = sections
        .iter()
        .filter(|s| matches!(s.outcome, SectionOutcome::Failed(_)))
        .map(|s| s.question_id.clone())
        .collect();

    send::send(config, &docx_path, generated_at.date(), &failed_questions).await?;

    Ok(RunOutcome {
        docx_path,
        failed_questions,
        summary_missing: executive_summary.is_none(),
    })
}

fn docx_path(output_dir: &str, generated_at: NaiveDateTime) -> PathBuf {
    PathBuf::from(output_dir).join(format!(
        "survey_report_{}.docx",
        generated_at.format("%Y-%m-%d")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_docx_path_is_dated() {
        let generated_at = NaiveDate::from_ymd_opt(2026, 8, 23)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap();
        assert_eq!(
            docx_path("/tmp/reports", generated_at),
            PathBuf::from("/tmp/reports/survey_report_2026-08-23.docx")
        );
    }
}
