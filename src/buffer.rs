// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/buffer.rs - 固定尺寸的输入输出缓冲区
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

use tracing::info;

use crate::{
  config::{INPUT_SIZE, OUTPUT_SIZE},
  device::{Device, DeviceBuffer, DeviceError, DevicePtr},
};

/// 检测器生命周期内唯一的一组缓冲区。
///
/// 分配一次，每帧复用，从不改变大小。
pub struct BufferPool<D: Device> {
  // 字段按分配的逆序声明，析构顺序即逆序释放
  host_output: Box<[f32]>,
  device_output: DeviceBuffer<D>,
  device_input: DeviceBuffer<D>,
  staging: Box<[f32]>,
  batch_size: usize,
}

impl<D: Device> BufferPool<D> {
  pub fn allocate(device: &Arc<D>, batch_size: usize) -> Result<Self, DeviceError> {
    let staging = vec![0.0f32; INPUT_SIZE].into_boxed_slice();
    let device_input = DeviceBuffer::alloc(device, batch_size * INPUT_SIZE)?;
    let device_output = DeviceBuffer::alloc(device, batch_size * OUTPUT_SIZE)?;
    let host_output = vec![0.0f32; batch_size * OUTPUT_SIZE].into_boxed_slice();

    info!(
      "缓冲区分配完成: 批大小 {}, 输入 {} 字节, 输出 {} 字节",
      batch_size,
      device_input.size_in_bytes(),
      device_output.size_in_bytes()
    );

    Ok(Self {
      host_output,
      device_output,
      device_input,
      staging,
      batch_size,
    })
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub fn device_input(&self) -> &DeviceBuffer<D> {
    &self.device_input
  }

  pub fn device_output(&self) -> &DeviceBuffer<D> {
    &self.device_output
  }

  /// 按绑定索引排列的设备指针
  pub fn bindings(&self) -> [DevicePtr; 2] {
    [self.device_input.ptr(), self.device_output.ptr()]
  }

  pub fn host_output(&self) -> &[f32] {
    &self.host_output
  }

  pub fn host_output_mut(&mut self) -> &mut [f32] {
    &mut self.host_output
  }

  /// 主机侧的单槽位暂存张量与设备输入指针
  pub fn staging_mut(&mut self) -> (&mut [f32], DevicePtr) {
    (&mut self.staging, self.device_input.ptr())
  }

  pub fn input_slot_offset(&self, slot: usize) -> usize {
    slot * INPUT_SIZE
  }

  /// 某个批槽位在主机输出镜像中的切片
  pub fn output_slot(&self, slot: usize) -> &[f32] {
    let start = slot * OUTPUT_SIZE;
    &self.host_output[start..start + OUTPUT_SIZE]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::HostDevice;

  #[test]
  fn sizes_follow_batch_constants() {
    let device = Arc::new(HostDevice::new());
    let pool = BufferPool::allocate(&device, 2).unwrap();

    assert_eq!(pool.device_input().len(), 2 * INPUT_SIZE);
    assert_eq!(pool.device_output().len(), 2 * OUTPUT_SIZE);
    assert_eq!(pool.host_output().len(), 2 * OUTPUT_SIZE);
    assert_eq!(pool.output_slot(1).len(), OUTPUT_SIZE);
    assert_eq!(pool.input_slot_offset(1), INPUT_SIZE);
    assert_eq!(device.stats().live_buffers, 2);
  }

  #[test]
  fn failed_output_allocation_releases_input() {
    let device = Arc::new(HostDevice::with_alloc_limit(1));
    assert!(BufferPool::allocate(&device, 1).is_err());

    let stats = device.stats();
    assert_eq!(stats.allocs, 1);
    assert_eq!(stats.frees, 1);
    assert_eq!(stats.live_buffers, 0);
  }

  #[test]
  fn drop_releases_every_device_buffer() {
    let device = Arc::new(HostDevice::new());
    drop(BufferPool::allocate(&device, 1).unwrap());

    let stats = device.stats();
    assert_eq!(stats.allocs, 2);
    assert_eq!(stats.frees, 2);
    assert_eq!(stats.live_elements, 0);
  }
}
