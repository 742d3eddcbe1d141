use async_trait::async_trait;
use reelcore::{NodeContext, NodeError, Processor, ProcessorMetadata, Value};
use std::collections::BTreeMap;
use tokio::time::{sleep, Duration};

/// Stand-in for one stage of the novel-to-anime pipeline.
///
/// The real stages call out to parsers and generation services; this one
/// waits `delay_ms` (falling back to the stage's own latency) and reports
/// empty outputs, which is enough to drive and observe a workflow end to end.
#[derive(Debug, Clone, Copy)]
pub struct StageProcessor {
    pub node_type: &'static str,
    pub description: &'static str,
    /// Collections the stage produces, e.g. `characters` or `scenes`.
    pub outputs: &'static [&'static str],
    /// Structured outputs, e.g. `metadata`.
    pub details: &'static [&'static str],
    pub default_delay_ms: u64,
}

pub const NOVEL_PARSER: StageProcessor = StageProcessor {
    node_type: "novel-parser",
    description: "Split novel text into chapters and paragraphs",
    outputs: &["chapters"],
    details: &[],
    default_delay_ms: 0,
};

pub const CHARACTER_ANALYZER: StageProcessor = StageProcessor {
    node_type: "character-analyzer",
    description: "Extract characters and their relationships",
    outputs: &["characters", "relationships"],
    details: &[],
    default_delay_ms: 0,
};

pub const SCENE_GENERATOR: StageProcessor = StageProcessor {
    node_type: "scene-generator",
    description: "Group chapters into scenes",
    outputs: &["scenes"],
    details: &[],
    default_delay_ms: 0,
};

pub const SCRIPT_CONVERTER: StageProcessor = StageProcessor {
    node_type: "script-converter",
    description: "Convert scenes into a shooting script",
    outputs: &["script"],
    details: &[],
    default_delay_ms: 0,
};

pub const VIDEO_GENERATOR: StageProcessor = StageProcessor {
    node_type: "video-generator",
    description: "Render storyboard frames into video",
    outputs: &["storyboards", "frames"],
    details: &[],
    default_delay_ms: 0,
};

/// The editor's five stages, in pipeline order.
pub const STAGES: [StageProcessor; 5] = [
    NOVEL_PARSER,
    CHARACTER_ANALYZER,
    SCENE_GENERATOR,
    SCRIPT_CONVERTER,
    VIDEO_GENERATOR,
];

#[async_trait]
impl Processor for StageProcessor {
    async fn process(&self, ctx: NodeContext) -> Result<Value, NodeError> {
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_delay_ms);

        tracing::debug!(
            node_id = %ctx.node_id,
            stage = self.node_type,
            delay_ms,
            "Running stage"
        );

        if delay_ms > 0 {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                _ = sleep(Duration::from_millis(delay_ms)) => {}
            }
        }

        let mut produced = Value::object();
        for key in self.outputs {
            produced.insert(*key, Value::Array(Vec::new()));
        }
        for key in self.details {
            produced.insert(*key, Value::object());
        }

        let upstream: Vec<Value> = ctx.results.keys().map(|id| Value::from(id.as_str())).collect();

        let mut out = Value::object();
        out.insert("stage", self.node_type);
        out.insert("node", ctx.node_name.as_str());
        out.insert("produced", produced);
        out.insert("upstream", upstream);
        Ok(out)
    }

    fn validate_config(&self, config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
        match config.get("delay_ms") {
            Some(value) if value.as_u64().is_none() => Err(NodeError::Configuration(format!(
                "delay_ms must be a non-negative integer, got {}",
                value.kind()
            ))),
            _ => Ok(()),
        }
    }

    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata {
            description: self.description.to_string(),
            category: "pipeline".to_string(),
        }
    }
}
