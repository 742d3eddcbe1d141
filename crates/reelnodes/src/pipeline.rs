use crate::stages::STAGES;
use reelcore::{Connection, NodeSpec, Workflow};

const STAGE_NAMES: [&str; 5] = [
    "Novel Parser",
    "Character Analyzer",
    "Scene Generator",
    "Script Converter",
    "Video Generator",
];

/// The default "Novel to Anime Pipeline": the five stages chained in order,
/// laid out left to right for the editor.
pub fn novel_pipeline() -> Workflow {
    let mut workflow = Workflow::new("Novel to Anime Pipeline")
        .with_description("Turn a novel into an anime video, one stage after another");

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
