//! The seven-stage production line registered by default alongside the
//! editor stages: parsing, character and plot analysis, episode planning,
//! scripting, storyboarding and video rendering.
//!
//! Each stage simulates its usual latency unless the node sets `delay_ms`.

use crate::stages::StageProcessor;
use reelcore::{Connection, NodeSpec, Workflow};

pub const NOVEL_PARSER: StageProcessor = StageProcessor {
    node_type: "novel_parser",
    description: "Parse the novel into chapters and first-pass characters",
    outputs: &["chapters", "characters"],
    details: &["metadata"],
    default_delay_ms: 2000,
};

pub const CHARACTER_SYSTEM: StageProcessor = StageProcessor {
    node_type: "character_system",
    description: "Build the character roster and relationships",
    outputs: &["characters", "relationships"],
    details: &[],
    default_delay_ms: 1500,
};

pub const PLOT_ANALYZER: StageProcessor = StageProcessor {
    node_type: "plot_analyzer",
    description: "Find plot points, themes and story structure",
    outputs: &["plotPoints", "themes"],
    details: &["structure"],
    default_delay_ms: 1800,
};

pub const EPISODE_GENERATOR: StageProcessor = StageProcessor {
    node_type: "episode_generator",
    description: "Split the story into episodes",
    outputs: &["episodes"],
    details: &["metadata"],
    default_delay_ms: 2500,
};

pub const SCRIPT_CONVERTER: StageProcessor = StageProcessor {
    node_type: "script_converter",
    description: "Write episode scripts and dialogue",
    outputs: &["scripts", "dialogues"],
    details: &[],
    default_delay_ms: 2000,
};

pub const STORYBOARD_CREATOR: StageProcessor = StageProcessor {
    node_type: "storyboard_creator",
    description: "Lay out storyboards shot by shot",
    outputs: &["storyboards", "shots"],
    details: &[],
    default_delay_ms: 3000,
};

pub const AI_VIDEO_GENERATOR: StageProcessor = StageProcessor {
    node_type: "ai_video_generator",
    description: "Render storyboards into video",
    outputs: &["videos"],
    details: &["metadata"],
    default_delay_ms: 5000,
};

/// All seven stages, in production order.
pub const STAGES: [StageProcessor; 7] = [
    NOVEL_PARSER,
    CHARACTER_SYSTEM,
    PLOT_ANALYZER,
    EPISODE_GENERATOR,
    SCRIPT_CONVERTER,
    STORYBOARD_CREATOR,
    AI_VIDEO_GENERATOR,
];

const STAGE_NAMES: [&str; 7] = [
    "Parse Novel",
    "Character Analysis",
    "Plot Analysis",
    "Generate Episodes",
    "Convert to Script",
    "Create Storyboard",
    "Generate Video",
];

/// The seven stages chained in production order, laid out left to right.
pub fn pipeline() -> Workflow {
    let mut workflow = Workflow::new("Novel to Anime Pipeline")
        .with_description("Default workflow for converting novels to animated videos");

    for (i, (stage, name)) in STAGES.iter().zip(STAGE_NAMES).enumerate() {
        workflow.nodes.push(
            NodeSpec::new(stage.node_type, stage.node_type)
                .with_name(name)
                .with_position(50.0 + 200.0 * i as f32, 100.0),
        );
    }

    for pair in STAGES.windows(2) {
        workflow
            .connections
            .push(Connection::new(pair[0].node_type, pair[1].node_type));
    }

    workflow
}
