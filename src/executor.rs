// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/executor.rs - 推理执行与同步
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

use std::time::Instant;

use tracing::debug;

use crate::{
  buffer::BufferPool,
  config::OUTPUT_SIZE,
  device::{Device, Stream},
  engine::Engine,
  error::{DetectorError, RuntimeExecutionError, UsageError},
};

/// 在执行流上运行网络，把输出拷回主机镜像并等待拷贝完成。
///
/// 返回后 `buffers.host_output()` 的前 `batch` 个槽位即为本次结果。
pub fn infer<E: Engine, D: Device>(
  engine: &E,
  network: &mut E::Network,
  device: &D,
  buffers: &mut BufferPool<D>,
  batch: usize,
  stream: &Stream<D>,
) -> Result<(), DetectorError> {
  if batch == 0 || batch > buffers.batch_size() {
    return Err(UsageError::BatchSize(batch, buffers.batch_size()).into());
  }

  let now = Instant::now();
  let bindings = buffers.bindings();
  engine
    .execute(network, device, bindings, batch, stream.id())
    .map_err(RuntimeExecutionError::from)?;

  let len = batch * OUTPUT_SIZE;
  device
    .copy_dtoh_async(&mut buffers.host_output_mut()[..len], bindings[1], 0, stream.id())
    .map_err(RuntimeExecutionError::from)?;
  stream.synchronize().map_err(RuntimeExecutionError::from)?;

  debug!("推理完成，批大小 {}, 耗时: {:.2?}", batch, now.elapsed());
  Ok(())
}
