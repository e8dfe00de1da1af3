// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;

use crate::{catalog::ClassCatalog, postprocess::Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 80;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
}

pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个类别一种颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      colors,
    }
  }
}

impl Draw {
  /// 不带字体时只绘制边框和标签底色
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn load_font(path: &Path) -> Result<FontArc, DrawError> {
    let data = std::fs::read(path).map_err(|source| DrawError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.to_path_buf()))
  }

  pub fn color_for(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 在帧的副本上绘制
  pub fn annotate(
    &self,
    frame: &RgbImage,
    detections: &[Detection],
    catalog: &ClassCatalog,
  ) -> RgbImage {
    let mut image = frame.clone();
    self.draw_detections(&mut image, detections, catalog);
    image
  }

  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    detections: &[Detection],
    catalog: &ClassCatalog,
  ) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection, catalog);
    }
  }

  fn draw_bbox_with_label(
    &self,
    image: &mut RgbImage,
    detection: &Detection,
    catalog: &ClassCatalog,
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let color = self.color_for(detection.class_id);
    let bbox = &detection.bbox;

    let x_min = (bbox.x.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y.floor() as i32).clamp(0, h - 1);
    let x_max = ((bbox.x + bbox.width).ceil() as i32).clamp(0, w - 1);
    let y_max = ((bbox.y + bbox.height).ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框向内加粗
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!(
      "{} {:.2}",
      catalog.label(detection.class_id),
      detection.confidence
    );

    // 标签放在边框上方，空间不足时贴着图像上沿
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x);
    let label_height = self.label_text_height.min(h - label_y);
    if label_width <= 0 || label_height <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
