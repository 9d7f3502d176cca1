use crate::config::Config;
use crate::error::{ReportError, ReportResult};
use crate::qualtrics::QualtricsClient;

/// One survey question with its non-empty free-text responses.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub responses: Vec<String>,
}

/// One respondent row for the raw-data appendix: the respondent id plus
/// the answer cells for the configured question columns.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub respondent_id: String,
    pub answers: Vec<String>,
}

#[derive(Debug)]
pub struct SurveyData {
    pub survey_id: String,
    pub questions: Vec<Question>,
    pub raw_rows: Vec<RawRow>,
}

#[tracing::instrument(
    name = "pipeline_stage fetch",
    skip(client, config),
    fields(
        pipeline.stage = "fetch",
        survey.id = %config.survey_id,
        survey.questions,
        survey.rows,
    )
)]
pub async fn fetch(client: &QualtricsClient, config: &Config) -> ReportResult<SurveyData> {
    let csv_text = client.export_responses(&config.survey_id).await?;
    let data = parse_export_csv(
        &csv_text,
        &config.survey_id,
        &config.questions,
        &config.id_column,
    )?;

    let span = tracing::Span::current();
    span.record("survey.questions", data.questions.len());
    span.record("survey.rows", data.raw_rows.len());

    tracing::info!(
        questions = data.questions.len(),
        rows = data.raw_rows.len(),
        "survey data fetched"
    );

    Ok(data)
}

/// Parses the Qualtrics CSV export. Layout: header row carries the column
/// names (question ids), the first record carries the human-readable
/// question text, the second carries import metadata (skipped), and the
/// remaining records are respondent rows.
pub fn parse_export_csv(
    csv_text: &str,
    survey_id: &str,
    question_ids: &[String],
    id_column: &str,
) -> ReportResult<SurveyData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReportError::Fetch(format!("export CSV had no header row: {e}")))?
        .clone();

    let mut records = Vec::new();
    for record in reader.records() {
        records
            .push(record.map_err(|e| ReportError::Fetch(format!("malformed export CSV: {e}")))?);
    }

    let text_row = records.first();
    let data_rows: &[csv::StringRecord] = if records.len() > 2 { &records[2..] } else { &[] };

    let column_of = |name: &str| headers.iter().position(|h| h == name);

    let questions = question_ids
        .iter()
        .map(|qid| {
            let Some(col) = column_of(qid) else {
                tracing::warn!(
                    question = %qid,
                    "question column not present in export, carrying with zero responses"
                );
                return Question {
                    id: qid.clone(),
                    text: qid.clone(),
                    responses: Vec::new(),
                };
            };

            let text = text_row
                .and_then(|row| row.get(col))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(qid)
                .to_string();

            let responses = data_rows
                .iter()
                .filter_map(|row| row.get(col))
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();

            Question {
                id: qid.clone(),
                text,
                responses,
            }
        })
        .collect();

    let id_col = column_of(id_column);
    if id_col.is_none() {
        tracing::warn!(column = %id_column, "respondent id column not present in export");
    }

    let raw_rows = data_rows
        .iter()
        .map(|row| RawRow {
            respondent_id: id_col
                .and_then(|c| row.get(c))
                .unwrap_or_default()
                .to_string(),
            answers: question_ids
                .iter()
                .map(|qid| {
                    column_of(qid)
                        .and_then(|c| row.get(c))
                        .unwrap_or_default()
                        .trim()
                        .to_string()
                })
                .collect(),
        })
        .collect();

    Ok(SurveyData {
        survey_id: survey_id.to_string(),
        questions,
        raw_rows,
    })
}
