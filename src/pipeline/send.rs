use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;
use crate::error::{ReportError, ReportResult};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Sends the converted report as one message to the full recipient list.
/// Single attempt; any failure is fatal for the run, and the DOCX stays on
/// disk for manual resend.
#[tracing::instrument(
    name = "pipeline_stage send",
    skip(config, failed_questions),
    fields(pipeline.stage = "send", recipients = config.recipients.len()),
)]
pub async fn send(
    config: &Config,
    docx_path: &Path,
    report_date: NaiveDate,
    failed_questions: &[String],
) -> ReportResult<()> {
    let attachment_bytes = tokio::fs::read(docx_path).await.map_err(|e| {
        ReportError::Delivery(format!(
            "failed to read converted report {}: {e}",
            docx_path.display()
        ))
    })?;

    let filename = docx_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "survey_report.docx".to_string());

    let subject = format!("{}: {}", config.report_title, report_date.format("%Y-%m-%d"));
    let body = message_body(failed_questions);

    let message = build_message(
        &config.smtp_sender,
        &config.recipients,
        &subject,
        &body,
        &filename,
        attachment_bytes,
    )?;

    let credentials = Credentials::new(config.smtp_sender.clone(), config.smtp_password.clone());
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        .map_err(|e| ReportError::Delivery(format!("invalid SMTP relay configuration: {e}")))?
        .credentials(credentials)
        .timeout(Some(Duration::from_secs(config.smtp_timeout_secs)))
        .build();

    tracing::info!(
        host = %config.smtp_host,
        recipients = config.recipients.len(),
        "sending report"
    );

    mailer
        .send(message)
        .await
        .map_err(|e| ReportError::Delivery(format!("mail submission failed: {e}")))?;

    tracing::info!("report sent");
    Ok(())
}

fn message_body(failed_questions: &[String]) -> String {
    let mut body = "Hi team, here's today's feedback report.".to_string();
    if !failed_questions.is_empty() {
        body.push_str(&format!(
            "\n\nNote: analysis could not be completed for {} question(s): {}.",
            failed_questions.len(),
            failed_questions.join(", ")
        ));
    }
    body
}

fn build_message(
    sender: &str,
    recipients: &[String],
    subject: &str,
    body: &str,
    attachment_name: &str,
    attachment_bytes: Vec<u8>,
) -> ReportResult<Message> {
    let from = sender
        .parse()
        .map_err(|e| ReportError::Delivery(format!("invalid sender address {sender}: {e}")))?;

    let mut builder = Message::builder().from(from).subject(subject);
    for recipient in recipients {
        let to = recipient.parse().map_err(|e| {
            ReportError::Delivery(format!("invalid recipient address {recipient}: {e}"))
        })?;
        builder = builder.to(to);
    }

    let content_type = ContentType::parse(DOCX_MIME)
        .map_err(|e| ReportError::Delivery(format!("invalid attachment content type: {e}")))?;

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(
                    Attachment::new(attachment_name.to_string())
                        .body(attachment_bytes, content_type),
                ),
        )
        .map_err(|e| ReportError::Delivery(format!("failed to build message: {e}")))
}
