use shiyu::{
  FromUrl,
  config::{ConfigError, PipelineConfig},
  detect::LabelTable,
  frame::{InputTensor, PixelFormat, RawFrame, TensorEncoding},
  model::{Interpreter, ReplayFixture, ReplayInterpreter, ReplayInterpreterBuilder},
  pipeline::{DetectionPipeline, ErrorKind, FrameOutcome},
};
use url::Url;

fn fixture_path(name: &str) -> String {
  format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn labels() -> LabelTable {
  LabelTable::from_file(fixture_path("labels.txt")).unwrap()
}

fn replay_with_query(query: &str) -> ReplayInterpreter {
  let url = Url::parse(&format!("replay://{}{}", fixture_path("replay.json"), query)).unwrap();
  ReplayInterpreterBuilder::from_url(&url).unwrap().build().unwrap()
}

fn replay() -> ReplayInterpreter {
  replay_with_query("")
}

fn bgra_frame(width: u32, height: u32) -> RawFrame {
  RawFrame::packed(
    width,
    height,
    PixelFormat::Bgra,
    vec![90; (width * height * 4) as usize],
  )
}

#[test]
fn fixture_pipeline_filters_ranks_and_labels() {
  let mut pipeline = DetectionPipeline::new(replay(), labels(), &PipelineConfig::default()).unwrap();
  let result = pipeline.run(&bgra_frame(64, 48)).unwrap();

  let scores: Vec<f32> = result.detections.iter().map(|d| d.confidence).collect();
  assert_eq!(scores, vec![0.9, 0.6]);
  let names: Vec<&str> = result.detections.iter().map(|d| d.label.as_str()).collect();
  assert_eq!(names, vec!["person", "bicycle"]);
  assert!(result.inference_ms >= 0.0);
  assert_eq!(pipeline.runtime().thread_count(), 1);
}

#[test]
fn runtime_threads_must_match_configuration() {
  let config = PipelineConfig::default().with_thread_count(2).unwrap();
  let pipeline = DetectionPipeline::new(replay_with_query("?threads=2"), labels(), &config).unwrap();
  assert_eq!(pipeline.runtime().thread_count(), 2);

  let config = PipelineConfig::default().with_thread_count(7).unwrap();
  assert!(matches!(
    DetectionPipeline::new(replay(), labels(), &config),
    Err(ConfigError::ThreadCountMismatch {
      configured: 7,
      runtime: 1
    })
  ));
}

#[test]
fn fixture_cycles_through_failure_and_empty_frames() {
  let mut pipeline = DetectionPipeline::new(replay(), labels(), &PipelineConfig::default()).unwrap();
  let frame = bgra_frame(32, 32);

  assert_eq!(pipeline.run(&frame).unwrap().detections.len(), 2);
  let err = pipeline.run(&frame).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InferenceFailed);
  assert!(pipeline.run(&frame).unwrap().is_empty());
  assert_eq!(pipeline.run(&frame).unwrap().detections.len(), 2);
}

#[test]
fn scheduler_scenario_over_live_stream() {
  let mut pipeline = DetectionPipeline::new(replay(), labels(), &PipelineConfig::default()).unwrap();
  let frame = bgra_frame(16, 16);

  let outcomes: Vec<bool> = [0, 150, 220]
    .into_iter()
    .map(|t| matches!(pipeline.process_frame(&frame, t), Ok(FrameOutcome::Completed(_))))
    .collect();
  assert_eq!(outcomes, vec![true, false, true]);
  assert_eq!(pipeline.scheduler().last_admitted_ms(), Some(220));
}

#[test]
fn float_model_receives_four_bytes_per_element() {
  let content = std::fs::read_to_string(fixture_path("replay.json")).unwrap();
  let mut fixture: ReplayFixture = serde_json::from_str(&content).unwrap();
  fixture.input.quantized = false;
  let runtime = ReplayInterpreter::from_fixture(fixture, 1).unwrap();
  assert_eq!(
    runtime.input_byte_len(),
    InputTensor::byte_len_for(16, 16, TensorEncoding::Float { mean: 127.5, std: 127.5 })
  );

  let mut pipeline = DetectionPipeline::new(runtime, labels(), &PipelineConfig::default()).unwrap();
  assert_eq!(pipeline.run(&bgra_frame(20, 10)).unwrap().detections.len(), 2);
}

#[test]
fn every_packed_layout_is_accepted() {
  for format in [
    PixelFormat::Rgba,
    PixelFormat::Bgra,
    PixelFormat::Argb,
    PixelFormat::Abgr,
    PixelFormat::Rgbx,
    PixelFormat::Bgrx,
    PixelFormat::Xrgb,
    PixelFormat::Xbgr,
  ] {
    let mut pipeline = DetectionPipeline::new(replay(), labels(), &PipelineConfig::default()).unwrap();
    let frame = RawFrame::packed(10, 10, format, vec![200; 400]);
    assert!(pipeline.run(&frame).is_ok(), "{format:?}");
  }
}

#[test]
fn padded_rows_are_honoured() {
  let mut pipeline = DetectionPipeline::new(replay(), labels(), &PipelineConfig::default()).unwrap();
  let stride = 10 * 4 + 24;
  let frame = RawFrame::new(10, 10, PixelFormat::Bgra, stride, vec![50; stride * 10]);
  assert_eq!(pipeline.run(&frame).unwrap().detections.len(), 2);
}

#[test]
fn invalid_configuration_is_rejected_at_startup() {
  let config = PipelineConfig::default().with_threshold(1.5);
  assert!(DetectionPipeline::new(replay(), labels(), &config).is_err());

  let url = Url::parse(&format!("replay://{}?threads=11", fixture_path("replay.json"))).unwrap();
  assert!(ReplayInterpreterBuilder::from_url(&url).is_err());

  let url = Url::parse("replay:///nonexistent/model.json").unwrap();
  assert!(ReplayInterpreterBuilder::from_url(&url).unwrap().build().is_err());
}

#[test]
fn label_table_shorter_than_model_classes_halts() {
  let short: LabelTable = ["???", "person"].into_iter().collect();
  let mut pipeline = DetectionPipeline::new(replay(), short, &PipelineConfig::default()).unwrap();
  let err = pipeline.run(&bgra_frame(16, 16)).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::LabelIndexOutOfRange);
  assert!(!err.is_recoverable());
}
