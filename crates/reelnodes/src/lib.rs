//! Standard node library
//!
//! Processors for the novel-to-anime pipeline stages (the editor's five and
//! the seven-stage production line in [`anime`]) plus small utility nodes,
//! and the default workflows that wire the stages together.

pub mod anime;
mod debug;
mod pipeline;
mod stages;
mod time;

pub use debug::DebugProcessor;
pub use pipeline::novel_pipeline;
pub use stages::{
    StageProcessor, CHARACTER_ANALYZER, NOVEL_PARSER, SCENE_GENERATOR, SCRIPT_CONVERTER, STAGES,
    VIDEO_GENERATOR,
};
pub use time::DelayProcessor;

use reelruntime::ProcessorRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &ProcessorRegistry) {
    for stage in STAGES.into_iter().chain(anime::STAGES) {
        registry.register(stage.node_type, Arc::new(stage));
    }
    registry.register("debug.log", Arc::new(DebugProcessor));
    registry.register("time.delay", Arc::new(DelayProcessor));
}
