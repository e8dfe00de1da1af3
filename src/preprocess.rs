// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/preprocess.rs - 帧预处理
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

//! Letterbox 缩放、归一化与 NHWC → NCHW 转换。
//!
//! 图像按比例缩放到长边贴合网络输入，居中放在灰色画布上，
//! 双线性采样后除以 255 写入平面布局的张量。

use image::RgbImage;
use tracing::debug;

use crate::{
  buffer::BufferPool,
  config::{INPUT_CHANNELS, PAD_VALUE},
  device::{Device, StreamId},
  error::{DetectorError, RuntimeExecutionError, UsageError},
};

/// 网络期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 网络输入坐标到原图坐标的映射，每帧重新计算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub src_width: u32,
  pub src_height: u32,
}

impl LetterboxTransform {
  pub fn new(src_width: u32, src_height: u32, dst_width: usize, dst_height: usize) -> Self {
    let scale =
      (dst_width as f32 / src_width as f32).min(dst_height as f32 / src_height as f32);
    let pad_x = (dst_width as f32 - scale * src_width as f32) / 2.0;
    let pad_y = (dst_height as f32 - scale * src_height as f32) / 2.0;
    Self {
      scale,
      pad_x,
      pad_y,
      src_width,
      src_height,
    }
  }

  /// 原图在画布上所占的尺寸
  pub fn placed_size(&self) -> (f32, f32) {
    (
      self.scale * self.src_width as f32,
      self.scale * self.src_height as f32,
    )
  }

  /// `orig = (net - pad) / scale`
  pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
  }

  pub fn to_network(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
  }
}

pub struct Preprocessor {
  width: usize,
  height: usize,
  channel_order: ChannelOrder,
}

impl Preprocessor {
  pub fn new(width: usize, height: usize, channel_order: ChannelOrder) -> Self {
    Self {
      width,
      height,
      channel_order,
    }
  }

  pub fn tensor_len(&self) -> usize {
    INPUT_CHANNELS * self.width * self.height
  }

  /// 把 `image` letterbox 到 `dst`（CHW 平面布局，长度为 3×H×W）
  pub fn letterbox(
    &self,
    image: &RgbImage,
    dst: &mut [f32],
  ) -> Result<LetterboxTransform, UsageError> {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
      return Err(UsageError::EmptyFrame {
        width: src_w,
        height: src_h,
      });
    }
    debug_assert_eq!(dst.len(), self.tensor_len());

    let transform = LetterboxTransform::new(src_w, src_h, self.width, self.height);
    let (placed_w, placed_h) = transform.placed_size();
    let plane = self.width * self.height;
    let (first, last) = match self.channel_order {
      ChannelOrder::Rgb => (0, 2),
      ChannelOrder::Bgr => (2, 0),
    };
    let pad = [PAD_VALUE as f32; 3];

    for y in 0..self.height {
      let cy = y as f32 + 0.5;
      let inside_y = cy >= transform.pad_y && cy < transform.pad_y + placed_h;
      let sy = (cy - transform.pad_y) / transform.scale - 0.5;

      for x in 0..self.width {
        let cx = x as f32 + 0.5;
        let inside = inside_y && cx >= transform.pad_x && cx < transform.pad_x + placed_w;
        let pixel = if inside {
          let sx = (cx - transform.pad_x) / transform.scale - 0.5;
          sample_bilinear(image, sx, sy)
        } else {
          pad
        };

        let idx = y * self.width + x;
        dst[first * plane + idx] = pixel[0] / 255.0;
        dst[plane + idx] = pixel[1] / 255.0;
        dst[last * plane + idx] = pixel[2] / 255.0;
      }
    }

    Ok(transform)
  }

  /// letterbox 到暂存区后写入设备输入缓冲区的 `slot` 槽位
  pub fn write_slot<D: Device>(
    &self,
    image: &RgbImage,
    buffers: &mut BufferPool<D>,
    slot: usize,
    device: &D,
    stream: StreamId,
  ) -> Result<LetterboxTransform, DetectorError> {
    let offset = buffers.input_slot_offset(slot);
    let (staging, input) = buffers.staging_mut();
    let transform = self.letterbox(image, staging)?;
    device
      .copy_htod_async(input, offset, staging, stream)
      .map_err(RuntimeExecutionError::from)?;

    debug!(
      "预处理槽位 {}: {}x{} -> scale {:.4}, pad ({:.1}, {:.1})",
      slot,
      transform.src_width,
      transform.src_height,
      transform.scale,
      transform.pad_x,
      transform.pad_y
    );
    Ok(transform)
  }
}

/// 像素中心对齐、边缘截断的双线性采样
fn sample_bilinear(image: &RgbImage, sx: f32, sy: f32) -> [f32; 3] {
  let (w, h) = image.dimensions();
  let sx = sx.clamp(0.0, (w - 1) as f32);
  let sy = sy.clamp(0.0, (h - 1) as f32);
  let x0 = sx.floor() as u32;
  let y0 = sy.floor() as u32;
  let x1 = (x0 + 1).min(w - 1);
  let y1 = (y0 + 1).min(h - 1);
  let fx = sx - x0 as f32;
  let fy = sy - y0 as f32;

  let p00 = image.get_pixel(x0, y0).0;
  let p10 = image.get_pixel(x1, y0).0;
  let p01 = image.get_pixel(x0, y1).0;
  let p11 = image.get_pixel(x1, y1).0;

  let mut out = [0.0f32; 3];
  for c in 0..3 {
    let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
    let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
    out[c] = top * (1.0 - fy) + bottom * fy;
  }
  out
}
