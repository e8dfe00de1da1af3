// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/frame.rs - 帧定义
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

use image::RgbImage;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// 交错排列的 RGB 图像
  pub image: RgbImage,
  /// 帧索引，从 0 开始
  pub index: u64,
  /// 相对于输入源打开时刻的时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 为输入源生成连续的帧索引和时间戳
#[derive(Debug)]
pub struct FrameClock {
  started: Instant,
  next_index: u64,
}

impl Default for FrameClock {
  fn default() -> Self {
    Self {
      started: Instant::now(),
      next_index: 0,
    }
  }
}

impl FrameClock {
  pub fn stamp(&mut self, image: RgbImage) -> Frame {
    let frame = Frame {
      image,
      index: self.next_index,
      timestamp_ms: self.started.elapsed().as_millis() as u64,
    };
    self.next_index += 1;
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn indices_are_consecutive() {
    let mut clock = FrameClock::default();
    let a = clock.stamp(RgbImage::new(4, 3));
    let b = clock.stamp(RgbImage::new(4, 3));
    assert_eq!((a.index, b.index), (0, 1));
    assert!(b.timestamp_ms >= a.timestamp_ms);
    assert_eq!((a.width(), a.height()), (4, 3));
  }
}
