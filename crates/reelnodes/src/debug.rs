use async_trait::async_trait;
use reelcore::{NodeContext, NodeError, Processor, ProcessorMetadata, Value};

/// Simple debug node that logs its message and what it can see of the run
pub struct DebugProcessor;

#[async_trait]
impl Processor for DebugProcessor {
    async fn process(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let message = ctx
            .config
            .get("message")
            .or_else(|| ctx.data.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();

        tracing::info!(node_id = %ctx.node_id, "DEBUG: {}", message);

        // Also log upstream results for visibility
        for (node_id, value) in &ctx.results {
            tracing::info!("  {}: {:?}", node_id, value);
        }

        let mut out = Value::object();
        out.insert("message", message);
        out.insert("upstream", ctx.results.len());
        Ok(out)
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: "Logs a message and upstream results for debugging".to_string(),
            category: "debug".to_string(),
        }
    }
}
