// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, catalog::ClassCatalog, detector::DetectOutput, frame::Frame,
  output::Render,
};

/// 把标注后的帧写到固定路径，多帧时后一帧覆盖前一帧
pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl SaveImageFileOutput {
  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    _frame: &Frame,
    result: &DetectOutput,
    _catalog: &ClassCatalog,
  ) -> Result<(), Self::Error> {
    self.save_image(&result.annotated)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn annotated_frame_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("result.png");
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = Frame {
      image: RgbImage::new(3, 3),
      index: 0,
      timestamp_ms: 0,
    };
    let result = DetectOutput {
      detections: Vec::new(),
      annotated: RgbImage::from_pixel(3, 3, image::Rgb([9, 9, 9])),
    };
    output
      .render_result(&frame, &result, &ClassCatalog::default())
      .unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.get_pixel(1, 1).0, [9, 9, 9]);
  }

  #[test]
  fn scheme_must_match() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
