// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  catalog::ClassCatalog,
  detector::DetectOutput,
  frame::Frame,
  output::Render,
  postprocess::{BoundingBox, Detection},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordEntry<'a> {
  bbox: &'a BoundingBox,
  confidence: f32,
  class_id: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  name: Option<&'a str>,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  frame: u64,
  timestamp: String,
  detections: Vec<RecordEntry<'a>>,
}

impl<'a> FrameRecord<'a> {
  fn new(
    frame: &Frame,
    now: &DateTime<Utc>,
    detections: &'a [Detection],
    catalog: &'a ClassCatalog,
  ) -> Self {
    Self {
      frame: frame.index,
      timestamp: now.to_rfc3339(),
      detections: detections
        .iter()
        .map(|d| RecordEntry {
          bbox: &d.bbox,
          confidence: d.confidence,
          class_id: d.class_id,
          name: catalog.name(d.class_id),
        })
        .collect(),
    }
  }
}

/// 按日期分目录保存结果。
///
/// `folder://<dir>?always&record`：`always` 时没有检测结果的帧也保存，
/// `record` 时保存原始帧和同名的 JSON 检测记录，否则保存标注后的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      always,
      frame_counter: AtomicU16::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    path: &Path,
    frame: &Frame,
    now: &DateTime<Utc>,
    result: &DetectOutput,
    catalog: &ClassCatalog,
  ) -> Result<(), DirectoryRecordOutputError> {
    let record = FrameRecord::new(frame, now, &result.detections, catalog);
    let file = std::fs::File::create(path.with_extension("json"))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &record)?;
    Ok(())
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &Frame,
    result: &DetectOutput,
    catalog: &ClassCatalog,
  ) -> Result<(), Self::Error> {
    if !self.always && result.detections.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.frame_path(&now)?;
    if self.record {
      frame.image.save(&path)?;
      Self::write_record(&path, frame, &now, result, catalog)?;
    } else {
      result.annotated.save(&path)?;
    }
    debug!("保存第 {} 帧结果到 {}", frame.index, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;

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

  fn frame() -> Frame {
    Frame {
      image: RgbImage::new(4, 4),
      index: 7,
      timestamp_ms: 0,
    }
  }

  fn result(detections: Vec<Detection>) -> DetectOutput {
    DetectOutput {
      detections,
      annotated: RgbImage::new(4, 4),
    }
  }

  #[test]
  fn frames_without_detections_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    output
      .render_result(&frame(), &result(Vec::new()), &ClassCatalog::default())
      .unwrap();

    let mut files = Vec::new();
    collect_files(dir.path(), &mut files);
    assert!(files.is_empty());
  }

  #[test]
  fn record_writes_raw_frame_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let url =
      url::Url::parse(&format!("folder://{}?always&record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let catalog: ClassCatalog = ["person"].into_iter().collect();
    let detections = vec![Detection {
      bbox: BoundingBox {
        x: 1.0,
        y: 1.0,
        width: 2.0,
        height: 2.0,
      },
      confidence: 0.75,
      class_id: 0,
    }];

    output
      .render_result(&frame(), &result(detections), &catalog)
      .unwrap();

    let mut files = Vec::new();
    collect_files(dir.path(), &mut files);
    files.sort();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].extension().unwrap(), "json");
    assert_eq!(files[1].extension().unwrap(), "png");

    let text = std::fs::read_to_string(&files[0]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["frame"], 7);
    assert_eq!(value["detections"][0]["name"], "person");
    assert_eq!(value["detections"][0]["class_id"], 0);
    assert_eq!(value["detections"][0]["bbox"]["width"], 2.0);
    assert!(value["timestamp"].is_string());
  }
}
