// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/input/read_directory.rs - 图像目录输入
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

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameClock},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取目录 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("目录中没有图像文件: {0}")]
  Empty(PathBuf),
}

/// 按文件名顺序逐个读取目录中的图像，解码失败的文件跳过
pub struct DirectoryInput {
  paths: std::vec::IntoIter<PathBuf>,
  clock: FrameClock,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let directory = PathBuf::from(url.path());
    let io_error = |source| DirectoryInputError::Io {
      path: directory.clone(),
      source,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&directory).map_err(io_error)? {
      let path = entry.map_err(io_error)?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if is_image && path.is_file() {
        paths.push(path);
      }
    }

    if paths.is_empty() {
      return Err(DirectoryInputError::Empty(directory));
    }
    paths.sort();
    info!("目录 {} 中共有 {} 个图像文件", directory.display(), paths.len());

    Ok(DirectoryInput {
      paths: paths.into_iter(),
      clock: FrameClock::default(),
    })
  }
}

impl Iterator for DirectoryInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.paths.by_ref() {
      match image::open(&path) {
        Ok(image) => return Some(self.clock.stamp(image.into_rgb8())),
        Err(e) => warn!("跳过无法解码的文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}
