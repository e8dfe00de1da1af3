// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameClock},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开图像文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无法解码图像文件 {path}: {source}")]
  Decode {
    path: String,
    #[source]
    source: image::ImageError,
  },
}

/// 只产生一帧的输入源
pub struct ImageFileInput {
  image: Option<RgbImage>,
  clock: FrameClock,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url.path().to_string();
    let image = ImageReader::open(&path)
      .map_err(|source| ImageFileInputError::Io {
        path: path.clone(),
        source,
      })?
      .decode()
      .map_err(|source| ImageFileInputError::Decode {
        path: path.clone(),
        source,
      })?;
    info!("读取图像 {}: {}x{}", path, image.width(), image.height());

    Ok(ImageFileInput {
      image: Some(image.into_rgb8()),
      clock: FrameClock::default(),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.image.take()?;
    Some(self.clock.stamp(image))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_exactly_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(6, 4, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();

    let url = Url::from_file_path(&path)
      .unwrap()
      .to_string()
      .replacen("file", "image", 1);
    let mut input = ImageFileInput::from_url(&Url::parse(&url).unwrap()).unwrap();

    let frame = input.next().unwrap();
    assert_eq!(frame.index, 0);
    assert_eq!(frame.image.dimensions(), (6, 4));
    assert_eq!(frame.image.get_pixel(0, 0).0, [1, 2, 3]);
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_file_names_the_path() {
    let url = Url::parse("image:///nonexistent/frame.png").unwrap();
    let err = ImageFileInput::from_url(&url).err().unwrap();
    assert!(err.to_string().contains("/nonexistent/frame.png"));
  }
}
