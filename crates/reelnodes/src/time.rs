use async_trait::async_trait;
use reelcore::{NodeContext, NodeError, Processor, ProcessorMetadata, Value};
use std::collections::BTreeMap;
use tokio::time::{sleep, Duration};

/// Delay execution for a specified duration
pub struct DelayProcessor;

#[async_trait]
impl Processor for DelayProcessor {
    async fn process(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(1000); // Default to 1 second if not specified

        tracing::info!(node_id = %ctx.node_id, "Delaying for {}ms", delay_ms);

        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => {}
        }

        // Pass the run's input data through
        Ok(ctx.data)
    }

    fn validate_config(&self, config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
        match config.get("delay_ms") {
            Some(value) if value.as_u64().is_none() => Err(NodeError::Configuration(
                "delay_ms must be a non-negative integer".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
        }
    }
}
