// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/device/host.rs - 主机内存模拟的设备
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
  collections::{HashMap, HashSet},
  sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, warn};

use super::{Device, DeviceError, DevicePtr, StreamId};

const HANDLE_BASE: u64 = 0x7f00_0000_0000;
const HANDLE_STRIDE: u64 = 0x1000;

/// 分配与拷贝计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
  pub allocs: usize,
  pub frees: usize,
  pub live_buffers: usize,
  pub live_elements: usize,
  pub streams_created: usize,
  pub streams_destroyed: usize,
  pub copies_htod: usize,
  pub copies_dtoh: usize,
  pub synchronizations: usize,
}

#[derive(Default)]
struct HostState {
  next_handle: u64,
  current: Option<u32>,
  buffers: HashMap<u64, Vec<f32>>,
  streams: HashSet<u64>,
  stats: DeviceStats,
}

/// 以主机内存实现的设备。
///
/// 拷贝立即完成，`synchronize` 只校验执行流。可以限制成功分配的次数，
/// 用于模拟初始化中途显存不足。
#[derive(Default)]
pub struct HostDevice {
  state: Mutex<HostState>,
  alloc_limit: Option<usize>,
}

impl HostDevice {
  pub fn new() -> Self {
    Self::default()
  }

  /// 第 `limit + 1` 次分配起返回 `OutOfMemory`
  pub fn with_alloc_limit(limit: usize) -> Self {
    Self {
      state: Mutex::default(),
      alloc_limit: Some(limit),
    }
  }

  pub fn stats(&self) -> DeviceStats {
    self.lock().stats
  }

  pub fn current_device(&self) -> Option<u32> {
    self.lock().current
  }

  /// 读取整块设备内存的快照
  pub fn read(&self, ptr: DevicePtr) -> Option<Vec<f32>> {
    self.lock().buffers.get(&ptr.0).cloned()
  }

  fn lock(&self) -> MutexGuard<'_, HostState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn next_handle(state: &mut HostState) -> u64 {
    state.next_handle += 1;
    HANDLE_BASE + state.next_handle * HANDLE_STRIDE
  }
}

fn check_stream(state: &HostState, stream: StreamId) -> Result<(), DeviceError> {
  if state.streams.contains(&stream.0) {
    Ok(())
  } else {
    Err(DeviceError::InvalidStream(stream))
  }
}

fn region<'a>(
  buffers: &'a mut HashMap<u64, Vec<f32>>,
  ptr: DevicePtr,
  offset: usize,
  len: usize,
) -> Result<&'a mut [f32], DeviceError> {
  let buffer = buffers
    .get_mut(&ptr.0)
    .ok_or(DeviceError::InvalidPointer(ptr))?;
  let capacity = buffer.len();
  match offset.checked_add(len) {
    Some(end) if end <= capacity => Ok(&mut buffer[offset..end]),
    _ => Err(DeviceError::OutOfBounds {
      ptr,
      offset,
      len,
      capacity,
    }),
  }
}

impl Device for HostDevice {
  fn set_device(&self, ordinal: u32) -> Result<(), DeviceError> {
    if ordinal != 0 {
      return Err(DeviceError::NoDevice(ordinal));
    }
    self.lock().current = Some(ordinal);
    debug!("选择主机设备 {}", ordinal);
    Ok(())
  }

  fn create_stream(&self) -> Result<StreamId, DeviceError> {
    let mut state = self.lock();
    let handle = Self::next_handle(&mut state);
    state.streams.insert(handle);
    state.stats.streams_created += 1;
    Ok(StreamId(handle))
  }

  fn destroy_stream(&self, stream: StreamId) -> Result<(), DeviceError> {
    let mut state = self.lock();
    if !state.streams.remove(&stream.0) {
      return Err(DeviceError::InvalidStream(stream));
    }
    state.stats.streams_destroyed += 1;
    Ok(())
  }

  fn alloc(&self, len: usize) -> Result<DevicePtr, DeviceError> {
    let mut state = self.lock();
    if let Some(limit) = self.alloc_limit
      && state.stats.allocs >= limit
    {
      warn!("主机设备分配次数达到上限 {}", limit);
      return Err(DeviceError::OutOfMemory { requested: len });
    }

    let handle = Self::next_handle(&mut state);
    state.buffers.insert(handle, vec![0.0; len]);
    state.stats.allocs += 1;
    state.stats.live_buffers += 1;
    state.stats.live_elements += len;
    Ok(DevicePtr(handle))
  }

  fn free(&self, ptr: DevicePtr) -> Result<(), DeviceError> {
    let mut state = self.lock();
    let buffer = state
      .buffers
      .remove(&ptr.0)
      .ok_or(DeviceError::InvalidPointer(ptr))?;
    state.stats.frees += 1;
    state.stats.live_buffers -= 1;
    state.stats.live_elements -= buffer.len();
    Ok(())
  }

  fn copy_htod_async(
    &self,
    dst: DevicePtr,
    offset: usize,
    src: &[f32],
    stream: StreamId,
  ) -> Result<(), DeviceError> {
    let mut state = self.lock();
    check_stream(&state, stream)?;
    region(&mut state.buffers, dst, offset, src.len())?.copy_from_slice(src);
    state.stats.copies_htod += 1;
    Ok(())
  }

  fn copy_dtoh_async(
    &self,
    dst: &mut [f32],
    src: DevicePtr,
    offset: usize,
    stream: StreamId,
  ) -> Result<(), DeviceError> {
    let mut state = self.lock();
    check_stream(&state, stream)?;
    dst.copy_from_slice(region(&mut state.buffers, src, offset, dst.len())?);
    state.stats.copies_dtoh += 1;
    Ok(())
  }

  fn synchronize(&self, stream: StreamId) -> Result<(), DeviceError> {
    let mut state = self.lock();
    check_stream(&state, stream)?;
    state.stats.synchronizations += 1;
    Ok(())
  }
}
