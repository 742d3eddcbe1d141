use reelcore::{NodeContext, NodeError, Processor, RunStatus, StartOptions, Value, Workflow};
use reelnodes::{
    anime, novel_pipeline, register_all, DebugProcessor, DelayProcessor, NOVEL_PARSER, STAGES,
    VIDEO_GENERATOR,
};
use reelruntime::{validate, Orchestrator};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// Helper function to create a test context
fn create_test_context(config: BTreeMap<String, Value>, data: Value) -> NodeContext {
    let mut ctx = NodeContext::new(Uuid::new_v4(), "node");
    ctx.config = config;
    ctx.data = data;
    ctx
}

fn delay_config(delay_ms: Value) -> BTreeMap<String, Value> {
    let mut config = BTreeMap::new();
    config.insert("delay_ms".to_string(), delay_ms);
    config
}

#[test]
fn test_novel_pipeline_is_a_valid_chain() {
    let wf = novel_pipeline();
    assert_eq!(wf.nodes.len(), 5);
    assert_eq!(wf.connections.len(), 4);
    assert_eq!(wf.nodes[0].node_type, "novel-parser");
    assert_eq!(wf.nodes[4].name, "Video Generator");

    let report = validate(&wf);
    assert!(report.is_valid(), "{}", report.summary());
    assert!(report.warnings.is_empty());

    let json = wf.to_json().unwrap();
    assert_eq!(Workflow::from_json(&json).unwrap(), wf);
}

#[tokio::test]
async fn test_novel_pipeline_runs_end_to_end() {
    let orchestrator = Orchestrator::new();
    register_all(orchestrator.registry());

    let mut wf = novel_pipeline();
    for node in &mut wf.nodes {
        node.configuration
            .insert("delay_ms".to_string(), Value::from(2u64));
    }

    let run_id = orchestrator
        .start(&wf, Value::object(), StartOptions::default())
        .await
        .unwrap();
    let run = tokio::time::timeout(Duration::from_secs(10), orchestrator.wait(run_id))
        .await
        .expect("pipeline should finish")
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress, 100);
    assert_eq!(run.context.results.len(), 5);

    let video = &run.context.results["video-generator"];
    assert_eq!(video.get("stage").and_then(Value::as_str), Some("video-generator"));
    assert_eq!(video.get("upstream").and_then(Value::as_array).map(<[Value]>::len), Some(4));
    assert!(video
        .get("produced")
        .and_then(|p| p.get("storyboards"))
        .is_some());
}

#[tokio::test]
async fn test_registered_types_are_listed() {
    let orchestrator = Orchestrator::new();
    register_all(orchestrator.registry());

    let types = orchestrator.registry().list_node_types();
    for stage in STAGES {
        assert!(types.contains(&stage.node_type.to_string()));
    }
    assert!(types.contains(&"debug.log".to_string()));
    assert_eq!(
        orchestrator
            .registry()
            .get_metadata("time.delay")
            .unwrap()
            .category,
        "time"
    );
}

#[test]
fn test_stage_rejects_bad_delay() {
    assert!(NOVEL_PARSER.validate_config(&BTreeMap::new()).is_ok());
    assert!(NOVEL_PARSER
        .validate_config(&delay_config(Value::from(10u64)))
        .is_ok());

    let err = VIDEO_GENERATOR
        .validate_config(&delay_config(Value::from(-5i64)))
        .unwrap_err();
    assert!(matches!(err, NodeError::Configuration(_)));
    assert!(DelayProcessor
        .validate_config(&delay_config(Value::from("soon")))
        .is_err());
}

#[tokio::test]
async fn test_delay_passes_data_through() {
    let mut data = Value::object();
    data.insert("chapter", 3u64);

    let ctx = create_test_context(delay_config(Value::from(5u64)), data.clone());
    let out = DelayProcessor.process(ctx).await.unwrap();
    assert_eq!(out, data);
}

#[tokio::test]
async fn test_delay_stops_when_cancelled() {
    let mut ctx = create_test_context(delay_config(Value::from(60_000u64)), Value::object());
    let token = CancellationToken::new();
    ctx.cancellation = token.clone();
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), DelayProcessor.process(ctx))
        .await
        .expect("cancelled delay should return promptly");
    assert_eq!(result, Err(NodeError::Cancelled));
}

#[tokio::test]
async fn test_debug_echoes_message() {
    let mut config = BTreeMap::new();
    config.insert("message".to_string(), Value::from("hello"));
    let mut ctx = create_test_context(config, Value::object());
    ctx.results.insert("upstream".to_string(), Value::Null);

    let out = DebugProcessor.process(ctx).await.unwrap();
    assert_eq!(out.get("message").and_then(Value::as_str), Some("hello"));
    assert_eq!(out.get("upstream").and_then(Value::as_u64), Some(1));
}

#[test]
fn test_anime_pipeline_chains_seven_stages() {
    let wf = anime::pipeline();
    let types: Vec<_> = wf.nodes.iter().map(|n| n.node_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "novel_parser",
            "character_system",
            "plot_analyzer",
            "episode_generator",
            "script_converter",
            "storyboard_creator",
            "ai_video_generator",
        ]
    );
    assert_eq!(wf.connections.len(), 6);
    assert_eq!(wf.nodes[6].name, "Generate Video");

    let report = validate(&wf);
    assert!(report.is_valid(), "{}", report.summary());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_anime_pipeline_runs_with_registered_stages() {
    let orchestrator = Orchestrator::new();
    register_all(orchestrator.registry());

    let mut wf = anime::pipeline();
    let report = orchestrator.validate(&wf);
    assert!(report.warnings.is_empty(), "{}", report.summary());

    for node in &mut wf.nodes {
        node.configuration
            .insert("delay_ms".to_string(), Value::from(1u64));
    }

    let run_id = orchestrator
        .start(&wf, Value::object(), StartOptions::default().sequential())
        .await
        .unwrap();
    let run = tokio::time::timeout(Duration::from_secs(10), orchestrator.wait(run_id))
        .await
        .expect("pipeline should finish")
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.context.results.len(), 7);

    let parsed = run.context.results["novel_parser"]
        .get("produced")
        .cloned()
        .unwrap();
    assert!(parsed.get("chapters").and_then(Value::as_array).is_some());
    assert!(parsed.get("characters").and_then(Value::as_array).is_some());
    assert!(parsed.get("metadata").and_then(Value::as_object).is_some());

    let plot = run.context.results["plot_analyzer"]
        .get("produced")
        .cloned()
        .unwrap();
    assert!(plot.get("plotPoints").and_then(Value::as_array).is_some());
    assert!(plot.get("structure").and_then(Value::as_object).is_some());
}

#[tokio::test]
async fn test_anime_stage_waits_its_default_latency() {
    let token = CancellationToken::new();
    token.cancel();

    let mut ctx = create_test_context(BTreeMap::new(), Value::object());
    ctx.cancellation = token.clone();
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        anime::CHARACTER_SYSTEM.process(ctx),
    )
    .await
    .expect("cancelled stage should return promptly");
    assert_eq!(result, Err(NodeError::Cancelled));

    // The editor stages have no latency of their own.
    let mut ctx = create_test_context(BTreeMap::new(), Value::object());
    ctx.cancellation = token;
    assert!(NOVEL_PARSER.process(ctx).await.is_ok());
}
