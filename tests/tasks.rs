// 该文件是 Liaowang （瞭望） 项目的一部分。
// tests/tasks.rs - 任务与输入输出集成测试
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

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use image::{Rgb, RgbImage};
use liaowang::{
  ClassCatalog, Detector, DetectorConfig, FromUrl,
  device::HostDevice,
  engine::{ReplayEngine, ReplayFrame, ReplayManifest, ReplayRecord},
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use url::Url;

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
  for entry in std::fs::read_dir(dir).unwrap() {
    let path = entry.unwrap().path();
    if path.is_dir() {
      collect_files(&path, out);
    } else {
      out.push(path);
    }
  }
}

// ctrlc 每个进程只能注册一次，连续任务只在这里运行一次
#[test]
fn continuous_task_stops_at_the_frame_limit() {
  let frames = tempfile::tempdir().unwrap();
  for name in ["000.png", "001.png", "002.png"] {
    RgbImage::from_pixel(320, 240, Rgb([40, 80, 120]))
      .save(frames.path().join(name))
      .unwrap();
  }

  let model = tempfile::NamedTempFile::new().unwrap();
  let manifest = ReplayManifest::standard(vec![ReplayFrame::new(vec![ReplayRecord {
    bbox: [320.0, 320.0, 100.0, 100.0],
    confidence: 0.7,
    class_id: 0,
  }])]);
  std::fs::write(model.path(), manifest.to_bytes().unwrap()).unwrap();

  let mut detector = Detector::new(
    ReplayEngine,
    Arc::new(HostDevice::new()),
    DetectorConfig::default(),
  );
  detector.initialize(model.path()).unwrap();

  let results = tempfile::tempdir().unwrap();
  let input =
    InputWrapper::from_url(&Url::parse(&format!("folder://{}", frames.path().display())).unwrap())
      .unwrap();
  let output = OutputWrapper::from_url(
    &Url::parse(&format!("folder://{}?record", results.path().display())).unwrap(),
  )
  .unwrap();
  let catalog: ClassCatalog = ["person"].into_iter().collect();

  ContinuousTask::default()
    .with_frame_number(Some(2))
    .run_task(input, detector, output, &catalog)
    .unwrap();

  let mut files = Vec::new();
  collect_files(results.path(), &mut files);
  let images = files
    .iter()
    .filter(|p| p.extension().is_some_and(|e| e == "png"))
    .count();
  let records: Vec<&PathBuf> = files
    .iter()
    .filter(|p| p.extension().is_some_and(|e| e == "json"))
    .collect();
  assert_eq!(images, 2);
  assert_eq!(records.len(), 2);

  for record in records {
    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
    assert_eq!(value["detections"][0]["name"], "person");
    // 320x240 的帧放大两倍后上下各填充 80
    assert_eq!(value["detections"][0]["bbox"]["x"], 135.0);
    assert_eq!(value["detections"][0]["bbox"]["y"], 95.0);
  }
}
