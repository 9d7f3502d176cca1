use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use super::{GenerateRequest, GenerateResponse, Provider};

/// Thin wrapper over a single provider. One attempt per call, bounded by
/// `timeout` so an unresponsive endpoint cannot hang the run. No retries
/// and no fallback provider: a failed run is re-invoked by the operator.
pub struct LlmClient {
    pub provider: Arc<dyn Provider>,
    pub timeout: Duration,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let span = tracing::info_span!(
            "gen_ai.chat",
            gen_ai.provider.name = %self.provider.name(),
            gen_ai.request.model = %req.model,
            gen_ai.request.temperature = req.temperature,
            gen_ai.request.max_tokens = req.max_tokens as i64,
            report.stage = %req.stage,
        );

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.provider.generate(req))
            .instrument(span)
            .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(resp)) => {
                if resp.content.trim().is_empty() {
                    anyhow::bail!(
                        "model {} returned empty content (finish reason: {})",
                        req.model,
                        if resp.finish_reason.is_empty() {
                            "unknown"
                        } else {
                            resp.finish_reason.as_str()
                        }
                    );
                }
                tracing::info!(
                    stage = %req.stage,
                    model = %resp.model,
                    elapsed_ms,
                    "inference complete"
                );
                Ok(resp)
            }
            Ok(Err(err)) => {
                tracing::warn!(stage = %req.stage, error = %err, "inference failed");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(stage = %req.stage, elapsed_ms, "inference timed out");
                anyhow::bail!(
                    "inference request timed out after {}s",
                    self.timeout.as_secs()
                )
            }
        }
    }
}
