// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/engine/replay.rs - 回放引擎
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

//! 以 JSON 清单为“编译产物”的引擎。
//!
//! 清单声明两个绑定和若干帧预先录制的检测记录，每次执行按顺序取出下一帧
//! （循环），以原始输出布局写入设备输出缓冲区：首元素为记录数量，随后是
//! `cx, cy, w, h, conf, class_id` 定长记录。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Binding, Engine, EngineError};
use crate::{
  config::{
    INPUT_CHANNELS, INPUT_H, INPUT_TENSOR_NAME, INPUT_W, OUTPUT_SIZE, OUTPUT_TENSOR_NAME,
    RECORD_WIDTH,
  },
  device::{Device, DevicePtr, StreamId},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
  /// 网络输入坐标系下的 [cx, cy, w, h]
  pub bbox: [f32; 4],
  pub confidence: f32,
  pub class_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
  #[serde(default)]
  pub records: Vec<ReplayRecord>,
  /// 覆盖写入输出首元素的数量，缺省为记录条数
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub count: Option<f32>,
}

impl ReplayFrame {
  pub fn new(records: Vec<ReplayRecord>) -> Self {
    Self {
      records,
      count: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayManifest {
  pub bindings: Vec<Binding>,
  #[serde(default)]
  pub frames: Vec<ReplayFrame>,
}

impl ReplayManifest {
  /// 按编译期常量声明绑定
  pub fn standard(frames: Vec<ReplayFrame>) -> Self {
    Self {
      bindings: vec![
        Binding {
          name: INPUT_TENSOR_NAME.to_string(),
          index: 0,
          shape: vec![INPUT_CHANNELS, INPUT_H, INPUT_W],
          is_input: true,
        },
        Binding {
          name: OUTPUT_TENSOR_NAME.to_string(),
          index: 1,
          shape: vec![OUTPUT_SIZE],
          is_input: false,
        },
      ],
      frames,
    }
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec_pretty(self).map_err(|e| EngineError::Deserialize(e.to_string()))
  }
}

pub struct ReplayNetwork {
  manifest: ReplayManifest,
  output_len: usize,
  cursor: usize,
  executions: usize,
  scratch: Vec<f32>,
}

impl ReplayNetwork {
  pub fn manifest(&self) -> &ReplayManifest {
    &self.manifest
  }

  /// 已执行的批次数
  pub fn executions(&self) -> usize {
    self.executions
  }

  fn fill_slot(&mut self) {
    self.scratch.fill(0.0);
    if self.manifest.frames.is_empty() {
      return;
    }

    let frame = &self.manifest.frames[self.cursor % self.manifest.frames.len()];
    self.cursor += 1;

    let capacity = self.output_len.saturating_sub(1) / RECORD_WIDTH;
    self.scratch[0] = frame.count.unwrap_or(frame.records.len() as f32);
    for (i, record) in frame.records.iter().take(capacity).enumerate() {
      let base = 1 + i * RECORD_WIDTH;
      let slot = &mut self.scratch[base..base + RECORD_WIDTH];
      slot[..4].copy_from_slice(&record.bbox);
      slot[4] = record.confidence;
      slot[5] = record.class_id as f32;
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayEngine;

impl Engine for ReplayEngine {
  type Network = ReplayNetwork;

  fn deserialize(&self, blob: &[u8]) -> Result<Self::Network, EngineError> {
    let manifest: ReplayManifest =
      serde_json::from_slice(blob).map_err(|e| EngineError::Deserialize(e.to_string()))?;

    let output_len = manifest
      .bindings
      .iter()
      .find(|b| !b.is_input)
      .map(Binding::volume)
      .ok_or_else(|| EngineError::Deserialize("清单中缺少输出绑定".to_string()))?;
    if output_len == 0 {
      return Err(EngineError::Deserialize("输出绑定大小为 0".to_string()));
    }

    info!(
      "回放清单: {} 个绑定, {} 帧记录",
      manifest.bindings.len(),
      manifest.frames.len()
    );

    Ok(ReplayNetwork {
      manifest,
      output_len,
      cursor: 0,
      executions: 0,
      scratch: vec![0.0; output_len],
    })
  }

  fn bindings(&self, network: &Self::Network) -> Vec<Binding> {
    network.manifest.bindings.clone()
  }

  fn execute<D: Device>(
    &self,
    network: &mut Self::Network,
    device: &D,
    buffers: [DevicePtr; 2],
    batch: usize,
    stream: StreamId,
  ) -> Result<(), EngineError> {
    if batch == 0 {
      return Err(EngineError::Execute("批大小为 0".to_string()));
    }

    for slot in 0..batch {
      network.fill_slot();
      device.copy_htod_async(buffers[1], slot * network.output_len, &network.scratch, stream)?;
    }
    network.executions += 1;
    debug!("回放引擎第 {} 次执行, 批大小 {}", network.executions, batch);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::device::{DeviceBuffer, HostDevice, Stream};

  fn person(cx: f32, confidence: f32) -> ReplayRecord {
    ReplayRecord {
      bbox: [cx, 100.0, 50.0, 80.0],
      confidence,
      class_id: 0,
    }
  }

  #[test]
  fn writes_count_and_records_in_layout_order() {
    let manifest = ReplayManifest::standard(vec![ReplayFrame::new(vec![
      person(10.0, 0.9),
      person(20.0, 0.7),
    ])]);
    let mut network = ReplayEngine.deserialize(&manifest.to_bytes().unwrap()).unwrap();

    let device = Arc::new(HostDevice::new());
    let stream = Stream::create(&device).unwrap();
    let input = DeviceBuffer::alloc(&device, 4).unwrap();
    let output = DeviceBuffer::alloc(&device, OUTPUT_SIZE).unwrap();

    ReplayEngine
      .execute(
        &mut network,
        device.as_ref(),
        [input.ptr(), output.ptr()],
        1,
        stream.id(),
      )
      .unwrap();

    let raw = device.read(output.ptr()).unwrap();
    assert_eq!(raw[0], 2.0);
    assert_eq!(&raw[1..7], &[10.0, 100.0, 50.0, 80.0, 0.9, 0.0]);
    assert_eq!(&raw[7..13], &[20.0, 100.0, 50.0, 80.0, 0.7, 0.0]);
    assert_eq!(raw[13], 0.0);
    assert_eq!(network.executions(), 1);
  }

  #[test]
  fn frames_cycle_across_executions() {
    let manifest = ReplayManifest::standard(vec![
      ReplayFrame::new(vec![person(1.0, 0.9)]),
      ReplayFrame::default(),
    ]);
    let mut network = ReplayEngine.deserialize(&manifest.to_bytes().unwrap()).unwrap();

    let device = Arc::new(HostDevice::new());
    let stream = Stream::create(&device).unwrap();
    let output = DeviceBuffer::alloc(&device, OUTPUT_SIZE).unwrap();
    let buffers = [output.ptr(), output.ptr()];

    let mut counts = Vec::new();
    for _ in 0..3 {
      ReplayEngine
        .execute(&mut network, device.as_ref(), buffers, 1, stream.id())
        .unwrap();
      counts.push(device.read(output.ptr()).unwrap()[0]);
    }
    assert_eq!(counts, vec![1.0, 0.0, 1.0]);
  }

  #[test]
  fn malformed_manifest_is_rejected() {
    assert!(matches!(
      ReplayEngine.deserialize(b"not json"),
      Err(EngineError::Deserialize(_))
    ));
    assert!(matches!(
      ReplayEngine.deserialize(br#"{"bindings": []}"#),
      Err(EngineError::Deserialize(_))
    ));
  }
}
