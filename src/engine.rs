// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::{Device, DeviceError, DevicePtr, StreamId};

mod replay;
pub use self::replay::{ReplayEngine, ReplayFrame, ReplayManifest, ReplayNetwork, ReplayRecord};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("反序列化失败: {0}")]
  Deserialize(String),
  #[error("推理执行失败: {0}")]
  Execute(String),
  #[error("设备错误: {0}")]
  Device(#[from] DeviceError),
}

/// 网络的一个输入或输出张量槽位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
  pub name: String,
  pub index: usize,
  /// 单个批元素的形状，不含批维度
  pub shape: Vec<usize>,
  pub is_input: bool,
}

impl Binding {
  pub fn volume(&self) -> usize {
    self.shape.iter().product()
  }
}

impl fmt::Display for Binding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "#{} {} {:?} ({})",
      self.index,
      self.name,
      self.shape,
      if self.is_input { "输入" } else { "输出" }
    )
  }
}

/// 编译好的网络的执行能力。
///
/// `Network` 持有运行时、引擎与执行上下文，析构即释放。
pub trait Engine {
  type Network;

  fn deserialize(&self, blob: &[u8]) -> Result<Self::Network, EngineError>;

  fn bindings(&self, network: &Self::Network) -> Vec<Binding>;

  /// 在执行流上异步执行网络。`buffers` 按绑定索引排列。
  fn execute<D: Device>(
    &self,
    network: &mut Self::Network,
    device: &D,
    buffers: [DevicePtr; 2],
    batch: usize,
    stream: StreamId,
  ) -> Result<(), EngineError>;
}
