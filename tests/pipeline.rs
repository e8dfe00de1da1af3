// 该文件是 Liaowang （瞭望） 项目的一部分。
// tests/pipeline.rs - 检测流水线集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::Arc;

use image::{Rgb, RgbImage};
use liaowang::{
  ClassCatalog, Detector, DetectorConfig, DetectorError,
  artifact::ArtifactError,
  config::{INPUT_H, INPUT_SIZE, INPUT_W, PAD_VALUE},
  device::{DeviceError, HostDevice},
  engine::{Binding, ReplayEngine, ReplayFrame, ReplayManifest, ReplayRecord},
  error::{RuntimeExecutionError, UsageError},
};
use tempfile::NamedTempFile;

fn record(bbox: [f32; 4], confidence: f32, class_id: u32) -> ReplayRecord {
  ReplayRecord {
    bbox,
    confidence,
    class_id,
  }
}

fn write_model(manifest: &ReplayManifest) -> NamedTempFile {
  let file = NamedTempFile::new().unwrap();
  std::fs::write(file.path(), manifest.to_bytes().unwrap()).unwrap();
  file
}

fn person_and_car() -> ReplayManifest {
  ReplayManifest::standard(vec![ReplayFrame::new(vec![
    record([100.0, 100.0, 100.0, 100.0], 0.9, 0),
    record([110.0, 100.0, 100.0, 100.0], 0.4, 0),
    record([400.0, 400.0, 80.0, 60.0], 0.8, 1),
  ])])
}

fn catalog() -> ClassCatalog {
  ClassCatalog::parse("person\n\ncar\nbicycle\n")
}

fn ready_detector(
  model: &NamedTempFile,
  device: Arc<HostDevice>,
) -> Detector<ReplayEngine, HostDevice> {
  let config = DetectorConfig::default()
    .with_confidence_threshold(0.5)
    .with_nms_threshold(0.5);
  let mut detector = Detector::new(ReplayEngine, device, config);
  detector.initialize(model.path()).unwrap();
  detector
}

#[test]
fn person_and_car_end_to_end() {
  let model = write_model(&person_and_car());
  let mut detector = ready_detector(&model, Arc::new(HostDevice::new()));
  let catalog = catalog();

  let frame = RgbImage::new(640, 640);
  let output = detector.detect(&frame, &catalog).unwrap();

  assert_eq!(output.detections.len(), 2);
  let person = &output.detections[0];
  let car = &output.detections[1];
  assert_eq!(catalog.name(person.class_id), Some("person"));
  assert_eq!(person.confidence, 0.9);
  assert!((person.bbox.x - 50.0).abs() < 1e-3);
  assert!((person.bbox.y - 50.0).abs() < 1e-3);
  assert!((person.bbox.width - 100.0).abs() < 1e-3);
  assert_eq!(catalog.name(car.class_id), Some("car"));
  assert_eq!(car.confidence, 0.8);
  assert!((car.bbox.x - 360.0).abs() < 1e-3);
  assert!((car.bbox.y - 370.0).abs() < 1e-3);

  assert_eq!(output.annotated.dimensions(), frame.dimensions());
  assert_ne!(output.annotated, frame);
}

#[test]
fn letterboxed_frame_reaches_the_device_input() {
  let model = write_model(&person_and_car());
  let device = Arc::new(HostDevice::new());
  let mut detector = ready_detector(&model, device.clone());

  // 1280x720 -> scale 0.5, 上下各填充 140 行
  let frame = RgbImage::from_pixel(1280, 720, Rgb([255, 0, 0]));
  detector.detect(&frame, &catalog()).unwrap();

  let input = device
    .read(detector.buffers().unwrap().device_input().ptr())
    .unwrap();
  assert_eq!(input.len(), INPUT_SIZE);

  let plane = INPUT_W * INPUT_H;
  let pad = PAD_VALUE as f32 / 255.0;
  for channel in 0..3 {
    assert!((input[channel * plane] - pad).abs() < 1e-6);
    assert!((input[channel * plane + plane - 1] - pad).abs() < 1e-6);
  }

  let center = (INPUT_H / 2) * INPUT_W + INPUT_W / 2;
  assert!((input[center] - 1.0).abs() < 1e-6);
  assert!(input[plane + center].abs() < 1e-6);
  assert!(input[2 * plane + center].abs() < 1e-6);
}

#[test]
fn buffers_are_reused_across_frames() {
  let model = write_model(&person_and_car());
  let device = Arc::new(HostDevice::new());
  let mut detector = ready_detector(&model, device.clone());
  let catalog = catalog();

  let pointers = detector.buffers().unwrap().bindings();
  let allocs = device.stats().allocs;

  for size in [(640, 480), (1920, 1080), (320, 320), (100, 900), (640, 640)] {
    let frame = RgbImage::new(size.0, size.1);
    let output = detector.detect(&frame, &catalog).unwrap();
    assert_eq!(output.detections.len(), 2);
  }

  assert_eq!(detector.buffers().unwrap().bindings(), pointers);
  let stats = device.stats();
  assert_eq!(stats.allocs, allocs);
  assert_eq!(stats.frees, 0);
  assert_eq!(stats.synchronizations, 5);
}

#[test]
fn partial_initialize_releases_what_it_acquired() {
  let model = write_model(&person_and_car());
  // 输入缓冲区分配成功，输出缓冲区分配失败
  let device = Arc::new(HostDevice::with_alloc_limit(1));
  let mut detector = Detector::new(ReplayEngine, device.clone(), DetectorConfig::default());

  let err = detector.initialize(model.path()).unwrap_err();
  assert!(matches!(
    err,
    DetectorError::Runtime(RuntimeExecutionError::Device(
      DeviceError::OutOfMemory { .. }
    ))
  ));
  assert!(!detector.is_ready());

  let stats = device.stats();
  assert_eq!(stats.allocs, 1);
  assert_eq!(stats.frees, 1);
  assert_eq!(stats.live_buffers, 0);
  assert_eq!(stats.streams_created, 1);
  assert_eq!(stats.streams_destroyed, 1);
}

#[test]
fn dropping_the_detector_releases_everything() {
  let model = write_model(&person_and_car());
  let device = Arc::new(HostDevice::new());
  let mut detector = ready_detector(&model, device.clone());
  detector.detect(&RgbImage::new(64, 48), &catalog()).unwrap();
  drop(detector);

  let stats = device.stats();
  assert_eq!(stats.allocs, stats.frees);
  assert_eq!(stats.live_buffers, 0);
  assert_eq!(stats.live_elements, 0);
  assert_eq!(stats.streams_created, stats.streams_destroyed);
}

#[test]
fn detect_requires_initialize() {
  let mut detector = Detector::new(
    ReplayEngine,
    Arc::new(HostDevice::new()),
    DetectorConfig::default(),
  );
  let err = detector
    .detect(&RgbImage::new(640, 480), &catalog())
    .unwrap_err();
  assert!(matches!(err, DetectorError::Usage(UsageError::NotInitialized)));
}

#[test]
fn extra_binding_is_a_configuration_error() {
  let mut manifest = person_and_car();
  manifest.bindings.push(Binding {
    name: "aux".to_string(),
    index: 2,
    shape: vec![1],
    is_input: false,
  });
  let model = write_model(&manifest);
  let device = Arc::new(HostDevice::new());
  let mut detector = Detector::new(ReplayEngine, device.clone(), DetectorConfig::default());

  let err = detector.initialize(model.path()).unwrap_err();
  assert!(matches!(
    err,
    DetectorError::Artifact(ArtifactError::BindingCount {
      expected: 2,
      actual: 3
    })
  ));
  assert_eq!(device.stats().allocs, 0);
  assert_eq!(device.stats().streams_destroyed, 1);
}

#[test]
fn advertised_count_bounds_the_decoded_records() {
  let mut frame = ReplayFrame::new(vec![
    record([100.0, 100.0, 50.0, 50.0], 0.9, 0),
    record([400.0, 400.0, 50.0, 50.0], 0.9, 1),
  ]);
  frame.count = Some(1.0);
  let model = write_model(&ReplayManifest::standard(vec![frame]));
  let mut detector = ready_detector(&model, Arc::new(HostDevice::new()));

  let output = detector
    .detect(&RgbImage::new(640, 640), &catalog())
    .unwrap();
  assert_eq!(output.detections.len(), 1);
  assert_eq!(output.detections[0].class_id, 0);
}
