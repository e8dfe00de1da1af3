// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/error.rs - 检测器错误定义
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

use thiserror::Error;

use crate::{artifact::ArtifactError, device::DeviceError, engine::EngineError};

/// 设备或推理引擎在运行期报告的错误。
///
/// 出现该错误后缓冲区与引擎状态不再可信，调用方应当重建检测器或退出。
#[derive(Error, Debug)]
pub enum RuntimeExecutionError {
  #[error("设备错误: {0}")]
  Device(#[from] DeviceError),
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
}

/// 调用顺序或参数错误，属于编程错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
  #[error("检测器尚未初始化")]
  NotInitialized,
  #[error("检测器已经初始化")]
  AlreadyInitialized,
  #[error("批大小 {0} 超出范围 1..={1}")]
  BatchSize(usize, usize),
  #[error("输入帧尺寸为空: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型文件错误: {0}")]
  Artifact(#[from] ArtifactError),
  #[error("运行期错误: {0}")]
  Runtime(#[from] RuntimeExecutionError),
  #[error("使用错误: {0}")]
  Usage(#[from] UsageError),
}

impl From<DeviceError> for DetectorError {
  fn from(err: DeviceError) -> Self {
    DetectorError::Runtime(RuntimeExecutionError::Device(err))
  }
}
