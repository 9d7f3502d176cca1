use crate::llm::{GenerateRequest, LlmClient};

use super::analyze::AnalysisSection;

const SYSTEM_PROMPT: &str = "You are a senior research director. Synthesize the \
    following individual analyses from a survey feedback report into a single, \
    cohesive summary paragraph (3-5 sentences) highlighting the most important \
    cross-cutting takeaways.";

/// Issues one inference request over the per-question narratives. Failure is
/// non-fatal: the report proceeds without an executive summary and the
/// assembler notes its absence.
#[tracing::instrument(
    name = "pipeline_stage synthesize",
    skip(llm_client, sections),
    fields(pipeline.stage = "synthesize", synthesis.narratives),
)]
pub async fn synthesize(
    llm_client: &LlmClient,
    model: &str,
    sections: &[AnalysisSection],
) -> Option<String> {
    let narratives: Vec<&str> = sections.iter().filter_map(|s| s.narrative()).collect();

    tracing::Span::current().record("synthesis.narratives", narratives.len());

    if narratives.is_empty() {
        tracing::warn!("no narratives available, skipping executive summary");
        return None;
    }

    let prompt = format!(
        "Please synthesize these points into a single paragraph:\n\n---\n\n{}",
        narratives.join("\n\n")
    );

    match llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: 0.1,
            max_tokens: 1024,
            stage: "synthesize".to_string(),
        })
        .await
    {
        Ok(resp) => Some(resp.content.trim().to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "executive summary synthesis failed, continuing without it");
            None
        }
    }
}
