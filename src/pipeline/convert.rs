use std::io::ErrorKind;
use std::path::Path;

use tokio::process::Command;

use crate::error::{ReportError, ReportResult};

/// Converts the assembled markdown to DOCX by invoking pandoc.
///
/// The markdown is written to a scoped temp file; the output lands at
/// `output_path` outside the temp dir so it survives a later delivery
/// failure for manual resend. The temp input is removed on all exit paths
/// when the `TempDir` drops.
#[tracing::instrument(
    name = "pipeline_stage convert",
    skip(markdown),
    fields(pipeline.stage = "convert", output = %output_path.display()),
)]
pub async fn convert(markdown: &str, output_path: &Path) -> ReportResult<()> {
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ReportError::Conversion(format!("failed to create temp dir: {e}")))?;
    let input_path = temp_dir.path().join("report.md");

    tokio::fs::write(&input_path, markdown)
        .await
        .map_err(|e| ReportError::Conversion(format!("failed to write report markdown: {e}")))?;

    run_converter("pandoc", &input_path, output_path).await?;

    tracing::info!(output = %output_path.display(), "report converted to DOCX");
    Ok(())
}

async fn run_converter(program: &str, input: &Path, output: &Path) -> ReportResult<()> {
    let result = Command::new(program)
        .arg(input)
        .arg("-o")
        .arg(output)
        .output()
        .await;

    let output_info = match result {
        Ok(info) => info,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ReportError::Conversion(format!(
                "`{program}` was not found on PATH; install pandoc to enable DOCX conversion"
            )));
        }
        Err(e) => {
            return Err(ReportError::Conversion(format!(
                "failed to invoke `{program}`: {e}"
            )));
        }
    };

    if !output_info.status.success() {
        let stderr = String::from_utf8_lossy(&output_info.stderr);
        return Err(ReportError::Conversion(format!(
            "`{program}` exited with {}: {}",
            output_info.status,
            stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_converter_names_the_tool() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.md");
        tokio::fs::write(&input, "# hi").await.unwrap();

        let err = run_converter("pandoc-definitely-missing", &input, &dir.path().join("out.docx"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "convert");
        assert!(err.to_string().contains("pandoc-definitely-missing"));
        assert!(err.to_string().contains("not found on PATH"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.md");
        tokio::fs::write(&input, "# hi").await.unwrap();

        // `false` ignores its arguments and exits 1.
        let err = run_converter("false", &input, &dir.path().join("out.docx"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "convert");
        assert!(err.to_string().contains("exited with"));
    }

    #[tokio::test]
    async fn test_successful_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.md");
        tokio::fs::write(&input, "# hi").await.unwrap();

        // `true` ignores its arguments and exits 0.
        run_converter("true", &input, &dir.path().join("out.docx"))
            .await
            .unwrap();
    }
}
