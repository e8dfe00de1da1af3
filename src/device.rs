// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/device.rs - 设备内存与执行流
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

//! 加速器的最小能力接口。
//!
//! 设备内存以 `f32` 元素为单位计量。`DeviceBuffer` 与 `Stream` 持有句柄，
//! 析构时归还给设备，因此任何退出路径都不会泄漏或重复释放。

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, error};

mod host;
pub use self::host::{DeviceStats, HostDevice};

/// 设备内存句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(pub u64);

impl fmt::Display for DevicePtr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "0x{:012x}", self.0)
  }
}

/// 执行流句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
  #[error("设备 {0} 不可用")]
  NoDevice(u32),
  #[error("设备内存不足，请求 {requested} 个元素")]
  OutOfMemory { requested: usize },
  #[error("无效的设备内存句柄: {0}")]
  InvalidPointer(DevicePtr),
  #[error("无效的执行流: {0:?}")]
  InvalidStream(StreamId),
  #[error("越界访问 {ptr}: 偏移 {offset}, 长度 {len}, 容量 {capacity}")]
  OutOfBounds {
    ptr: DevicePtr,
    offset: usize,
    len: usize,
    capacity: usize,
  },
  #[error("驱动错误: {0}")]
  Driver(String),
}

pub trait Device {
  fn set_device(&self, ordinal: u32) -> Result<(), DeviceError>;

  fn create_stream(&self) -> Result<StreamId, DeviceError>;
  fn destroy_stream(&self, stream: StreamId) -> Result<(), DeviceError>;

  fn alloc(&self, len: usize) -> Result<DevicePtr, DeviceError>;
  fn free(&self, ptr: DevicePtr) -> Result<(), DeviceError>;

  /// 把 `src` 写入 `dst[offset..offset + src.len()]`。
  /// 返回时 `src` 已被读取完毕，可以立即复用；设备侧的可见顺序由执行流保证。
  fn copy_htod_async(
    &self,
    dst: DevicePtr,
    offset: usize,
    src: &[f32],
    stream: StreamId,
  ) -> Result<(), DeviceError>;

  /// 把 `src[offset..offset + dst.len()]` 读回 `dst`。
  /// `dst` 只在调用期间被借用，返回时数据已写入 `dst`；
  /// 同一执行流上先前提交的设备工作由 `synchronize` 排序。
  fn copy_dtoh_async(
    &self,
    dst: &mut [f32],
    src: DevicePtr,
    offset: usize,
    stream: StreamId,
  ) -> Result<(), DeviceError>;

  fn synchronize(&self, stream: StreamId) -> Result<(), DeviceError>;
}

/// 独占的设备内存区域
pub struct DeviceBuffer<D: Device> {
  device: Arc<D>,
  ptr: DevicePtr,
  len: usize,
}

impl<D: Device> DeviceBuffer<D> {
  pub fn alloc(device: &Arc<D>, len: usize) -> Result<Self, DeviceError> {
    let ptr = device.alloc(len)?;
    debug!("分配设备内存 {}: {} 个元素", ptr, len);
    Ok(Self {
      device: Arc::clone(device),
      ptr,
      len,
    })
  }

  pub fn ptr(&self) -> DevicePtr {
    self.ptr
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn size_in_bytes(&self) -> usize {
    self.len * std::mem::size_of::<f32>()
  }
}

impl<D: Device> fmt::Debug for DeviceBuffer<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DeviceBuffer")
      .field("ptr", &self.ptr)
      .field("len", &self.len)
      .finish()
  }
}

impl<D: Device> Drop for DeviceBuffer<D> {
  fn drop(&mut self) {
    match self.device.free(self.ptr) {
      Ok(()) => debug!("释放设备内存 {}", self.ptr),
      Err(e) => error!("释放设备内存 {} 失败: {}", self.ptr, e),
    }
  }
}

/// 独占的执行流
pub struct Stream<D: Device> {
  device: Arc<D>,
  id: StreamId,
}

impl<D: Device> Stream<D> {
  pub fn create(device: &Arc<D>) -> Result<Self, DeviceError> {
    let id = device.create_stream()?;
    debug!("创建执行流 {:?}", id);
    Ok(Self {
      device: Arc::clone(device),
      id,
    })
  }

  pub fn id(&self) -> StreamId {
    self.id
  }

  pub fn synchronize(&self) -> Result<(), DeviceError> {
    self.device.synchronize(self.id)
  }
}

impl<D: Device> fmt::Debug for Stream<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Stream").field(&self.id).finish()
  }
}

impl<D: Device> Drop for Stream<D> {
  fn drop(&mut self) {
    match self.device.destroy_stream(self.id) {
      Ok(()) => debug!("销毁执行流 {:?}", self.id),
      Err(e) => error!("销毁执行流 {:?} 失败: {}", self.id, e),
    }
  }
}
