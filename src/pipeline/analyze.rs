use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::llm::{GenerateRequest, LlmClient};

use super::fetch::Question;

/// One recurring theme identified across a question's responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub name: String,
    pub description: String,
    pub example: String,
    pub frequency: u32,
}

#[derive(Debug, Clone)]
pub enum SectionOutcome {
    Analyzed {
        narrative: String,
        themes: Vec<Theme>,
        response_count: usize,
    },
    NoResponses,
    Failed(String),
}

/// Per-question analysis output. Immutable once produced; the assembler
/// renders one report section from each, in configured question order.
#[derive(Debug, Clone)]
pub struct AnalysisSection {
    pub question_id: String,
    pub question_text: String,
    pub outcome: SectionOutcome,
}

impl AnalysisSection {
    pub fn narrative(&self) -> Option<&str> {
        match &self.outcome {
            SectionOutcome::Analyzed { narrative, .. } => Some(narrative),
            _ => None,
        }
    }
}

const SYSTEM_PROMPT: &str = "You are an expert qualitative research analyst. \
    You are precise, data-driven, and follow formatting instructions exactly. \
    Your language is concise and accessible. You do not invent or paraphrase \
    content not present in the provided data.";

/// Runs one inference request per question, sequentially, in the order
/// given. A question with zero responses never reaches the model. A failed
/// request degrades to a placeholder section; the run continues.
#[tracing::instrument(
    name = "pipeline_stage analyze",
    skip(llm_client, questions),
    fields(
        pipeline.stage = "analyze",
        analysis.sections,
        analysis.failures,
    )
)]
pub async fn analyze_all(
    llm_client: &LlmClient,
    model: &str,
    questions: &[Question],
) -> Vec<AnalysisSection> {
    let mut sections = Vec::with_capacity(questions.len());

    for question in questions {
        let outcome = if question.responses.is_empty() {
            tracing::info!(question = %question.id, "no responses, skipping inference");
            SectionOutcome::NoResponses
        } else {
            tracing::info!(
                question = %question.id,
                responses = question.responses.len(),
                "analyzing question"
            );
            match analyze_one(llm_client, model, question).await {
                Ok((narrative, themes)) => SectionOutcome::Analyzed {
                    narrative,
                    themes,
                    response_count: question.responses.len(),
                },
                Err(err) => {
                    tracing::warn!(question = %question.id, error = %err, "analysis failed");
                    SectionOutcome::Failed(err.to_string())
                }
            }
        };

        sections.push(AnalysisSection {
            question_id: question.id.clone(),
            question_text: question.text.clone(),
            outcome,
        });
    }

    let failures = sections
        .iter()
        .filter(|s| matches!(s.outcome, SectionOutcome::Failed(_)))
        .count();

    let span = tracing::Span::current();
    span.record("analysis.sections", sections.len());
    span.record("analysis.failures", failures);

    sections
}

async fn analyze_one(
    llm_client: &LlmClient,
    model: &str,
    question: &Question,
) -> ReportResult<(String, Vec<Theme>)> {
    let prompt = build_analysis_prompt(&question.text, &question.responses);

    let resp = llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: 0.1,
            max_tokens: 2048,
            stage: "analyze".to_string(),
        })
        .await
        .map_err(|e| ReportError::Analysis(e.to_string()))?;

    parse_analysis_response(&resp.content)
}

fn build_analysis_prompt(question_text: &str, responses: &[String]) -> String {
    let response_list = responses
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {r}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze the following collection of survey responses to a single question \
        and produce a thematic analysis.\n\n\
        Question asked: \"{question_text}\"\n\
        Total number of responses: {}\n\
        Raw responses:\n{response_list}\n\n\
        Identify 3-5 key themes, capturing both common and uncommon ideas. For each \
        theme give a concise name, a 1-2 sentence description, one verbatim response \
        that best exemplifies it, and the exact number of responses that mention it.\n\
        Then write a 3-5 sentence narrative summary of the key takeaways and patterns.\n\n\
        Return your analysis as JSON with this exact structure:\n\
        {{\n  \"narrative\": \"3-5 sentence summary\",\n  \
        \"themes\": [\n    {{\"name\": \"Theme name\", \"description\": \"1-2 sentences\", \
        \"example\": \"verbatim quote\", \"frequency\": 3}}\n  ]\n}}\n\n\
        Do not add any other text outside the JSON.",
        responses.len()
    )
}

fn parse_analysis_response(content: &str) -> ReportResult<(String, Vec<Theme>)> {
    let json_str = extract_json(content);

    #[derive(Deserialize)]
    struct RawAnalysis {
        narrative: Option<String>,
        themes: Option<Vec<Theme>>,
    }

    let raw: RawAnalysis = serde_json::from_str(&json_str)
        .map_err(|e| ReportError::Analysis(format!("model returned malformed analysis: {e}")))?;

    let narrative = raw.narrative.map(|n| n.trim().to_string()).unwrap_or_default();
    if narrative.is_empty() {
        return Err(ReportError::Analysis(
            "model returned an analysis without a narrative".to_string(),
        ));
    }

    Ok((narrative, raw.themes.unwrap_or_default()))
}

/// Pulls the JSON object out of model output that may wrap it in a code
/// fence or surrounding prose.
pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GenerateResponse, Provider};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const VALID_ANALYSIS: &str = r#"{"narrative": "Most participants valued the hands-on work.", "themes": [{"name": "Hands-on practice", "description": "Participants highlighted exercises.", "example": "The labs were great", "frequency": 2}]}"#;

    /// Provider that returns scripted outcomes and counts its invocations.
    struct ScriptedProvider {
        calls: Mutex<Vec<String>>,
        fail_on_call: Option<usize>,
    }

    impl ScriptedProvider {
        fn new(fail_on_call: Option<usize>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on_call,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
            let call_index = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(req.prompt.clone());
                calls.len()
            };
            if self.fail_on_call == Some(call_index) {
                anyhow::bail!("connection refused");
            }
            Ok(GenerateResponse {
                content: VALID_ANALYSIS.to_string(),
                model: "test-model".to_string(),
                finish_reason: "stop".to_string(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> LlmClient {
        LlmClient::new(provider, Duration::from_secs(5))
    }

    fn question(id: &str, responses: &[&str]) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {id}"),
            responses: responses.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_prompt_contains_all_responses_numbered() {
        let responses = vec![
            "Loved the pacing".to_string(),
            "More examples please".to_string(),
            "Great instructor".to_string(),
        ];
        let prompt = build_analysis_prompt("How was the workshop?", &responses);
        assert!(prompt.contains("Total number of responses: 3"));
        assert!(prompt.contains("1. Loved the pacing"));
        assert!(prompt.contains("2. More examples please"));
        assert!(prompt.contains("3. Great instructor"));
        assert!(prompt.contains("How was the workshop?"));
    }

    #[test]
    fn test_parse_analysis_valid() {
        let (narrative, themes) = parse_analysis_response(VALID_ANALYSIS).unwrap();
        assert_eq!(narrative, "Most participants valued the hands-on work.");
        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].name, "Hands-on practice");
        assert_eq!(themes[0].frequency, 2);
    }

    #[test]
    fn test_parse_analysis_fenced() {
        let content = format!("Here you go:\n```json\n{VALID_ANALYSIS}\n```");
        let (narrative, themes) = parse_analysis_response(&content).unwrap();
        assert!(!narrative.is_empty());
        assert_eq!(themes.len(), 1);
    }

    #[test]
    fn test_parse_analysis_malformed_is_error() {
        let err = parse_analysis_response("not json at all").unwrap_err();
        assert_eq!(err.stage(), "analyze");
    }

    #[test]
    fn test_parse_analysis_missing_narrative_is_error() {
        let err = parse_analysis_response(r#"{"themes": []}"#).unwrap_err();
        assert!(err.to_string().contains("without a narrative"));
    }

    #[test]
    fn test_extract_json_embedded_in_text() {
        let input = "The result is {\"a\": 1} and that's it.";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(extract_json(input), "{\"key\": \"value\"}");
    }

    #[tokio::test]
    async fn test_single_question_issues_one_request() {
        let provider = Arc::new(ScriptedProvider::new(None));
        let sections = analyze_all(
            &client(provider.clone()),
            "test-model",
            &[question("Q1", &["a", "b", "c"])],
        )
        .await;

        assert_eq!(provider.call_count(), 1);
        assert_eq!(sections.len(), 1);
        let prompt = &provider.calls.lock().unwrap()[0];
        assert!(prompt.contains("1. a") && prompt.contains("2. b") && prompt.contains("3. c"));
        match &sections[0].outcome {
            SectionOutcome::Analyzed {
                themes,
                response_count,
                ..
            } => {
                assert!(!themes.is_empty());
                assert_eq!(*response_count, 3);
            }
            other => panic!("expected analyzed section, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_question_never_reaches_the_model() {
        let provider = Arc::new(ScriptedProvider::new(None));
        let sections =
            analyze_all(&client(provider.clone()), "test-model", &[question("Q1", &[])]).await;

        assert_eq!(provider.call_count(), 0);
        assert!(matches!(sections[0].outcome, SectionOutcome::NoResponses));
    }

    #[tokio::test]
    async fn test_failure_on_one_question_does_not_stop_the_run() {
        let provider = Arc::new(ScriptedProvider::new(Some(2)));
        let questions = vec![
            question("Q1", &["a"]),
            question("Q2", &["b"]),
            question("Q3", &["c"]),
        ];
        let sections = analyze_all(&client(provider.clone()), "test-model", &questions).await;

        assert_eq!(provider.call_count(), 3);
        assert!(matches!(sections[0].outcome, SectionOutcome::Analyzed { .. }));
        assert!(matches!(sections[1].outcome, SectionOutcome::Failed(_)));
        assert!(matches!(sections[2].outcome, SectionOutcome::Analyzed { .. }));
    }

    #[tokio::test]
    async fn test_sections_follow_configured_order() {
        let provider = Arc::new(ScriptedProvider::new(None));
        let questions = vec![question("Q3", &["x"]), question("Q1", &["y"])];
        let sections = analyze_all(&client(provider), "test-model", &questions).await;
        assert_eq!(sections[0].question_id, "Q3");
        assert_eq!(sections[1].question_id, "Q1");
    }
}
