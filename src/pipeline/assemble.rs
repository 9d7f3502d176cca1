use chrono::NaiveDateTime;

use super::analyze::{AnalysisSection, SectionOutcome, Theme};
use super::fetch::RawRow;

/// Everything the assembler needs. Assembly is a pure function of these
/// inputs: identical params yield byte-identical markdown.
pub struct AssembleParams<'a> {
    pub title: &'a str,
    pub survey_id: &'a str,
    pub model: &'a str,
    pub generated_at: NaiveDateTime,
    pub executive_summary: Option<&'a str>,
    pub sections: &'a [AnalysisSection],
    pub raw_rows: &'a [RawRow],
    pub question_ids: &'a [String],
    pub id_column: &'a str,
    pub max_appendix_rows: usize,
}

/// Concatenates the report: title, executive summary (or absence note),
/// per-question sections in configured order, capped raw-data appendix,
/// methodology block. Output is pandoc-ready markdown.
pub fn assemble(params: &AssembleParams<'_>) -> String {
    let mut blocks: Vec<String> = vec![format!("# {}", params.title)];

    blocks.push("### Executive Summary".to_string());
    match params.executive_summary {
        Some(summary) => blocks.push(summary.to_string()),
        None => blocks.push(
            "*An executive summary could not be generated for this run.*".to_string(),
        ),
    }
    blocks.push("---".to_string());

    for section in params.sections {
        blocks.push(render_section(section));
    }

    blocks.push("---".to_string());
    blocks.push("### Appendix: Raw Data Sample".to_string());
    blocks.push(render_appendix(
        params.raw_rows,
        params.question_ids,
        params.id_column,
        params.max_appendix_rows,
    ));

    blocks.push("---".to_string());
    blocks.push("### Methodology".to_string());
    blocks.push(format!(
        "- **Report Generated On:** {}\n\
         - **Survey ID:** {}\n\
         - **Analysis Model:** `{}`\n\
         - **Process:** This report was generated by providing all responses for \
         a given question to a language model for a full thematic analysis in a \
         single step.",
        params.generated_at.format("%Y-%m-%d %H:%M:%S"),
        params.survey_id,
        params.model,
    ));

    blocks.join("\n\n")
}

fn render_section(section: &AnalysisSection) -> String {
    let heading = format!("### {}", section.question_text);

    match &section.outcome {
        SectionOutcome::Analyzed {
            narrative,
            themes,
            response_count,
        } => {
            let mut parts = vec![heading, "**Summary of Responses**".to_string(), narrative.clone()];
            if !themes.is_empty() {
                parts.push("**Thematic Table**".to_string());
                parts.push(render_theme_table(themes, *response_count));
            }
            parts.join("\n\n")
        }
        SectionOutcome::NoResponses => format!(
            "{heading}\n\n*No responses were submitted for this question.*"
        ),
        SectionOutcome::Failed(reason) => format!(
            "{heading}\n\n*Analysis could not be completed for this question: {}*",
            table_cell(reason)
        ),
    }
}

fn render_theme_table(themes: &[Theme], response_count: usize) -> String {
    let mut table = String::from(
        "| Theme | Description | Illustrative Example | Frequency | Relative Frequency |\n\
         |---|---|---|---|---|",
    );
    for theme in themes {
        table.push_str(&format!(
            "\n| {} | {} | \"{}\" | {} | {}% |",
            table_cell(&theme.name),
            table_cell(&theme.description),
            table_cell(&theme.example),
            theme.frequency,
            relative_frequency(theme.frequency, response_count),
        ));
    }
    table
}

/// Percentage of responses exhibiting a theme, rounded to a whole number.
fn relative_frequency(frequency: u32, response_count: usize) -> u32 {
    if response_count == 0 {
        return 0;
    }
    ((f64::from(frequency) * 100.0) / response_count as f64).round() as u32
}

fn render_appendix(
    raw_rows: &[RawRow],
    question_ids: &[String],
    id_column: &str,
    max_rows: usize,
) -> String {
    if raw_rows.is_empty() {
        return "*No raw responses were collected.*".to_string();
    }

    let shown = raw_rows.len().min(max_rows);
    let mut out = format!(
        "*Showing the first {shown} of {} total responses.*\n\n",
        raw_rows.len()
    );

    out.push_str(&format!("| {id_column} |"));
    for qid in question_ids {
        out.push_str(&format!(" {} |", table_cell(qid)));
    }
    out.push_str("\n|---|");
    for _ in question_ids {
        out.push_str("---|");
    }
    for row in &raw_rows[..shown] {
        out.push_str(&format!("\n| {} |", table_cell(&row.respondent_id)));
        for answer in &row.answers {
            out.push_str(&format!(" {} |", table_cell(answer)));
        }
    }
    out
}

/// Makes free text safe inside a markdown pipe table.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}
