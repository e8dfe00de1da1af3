// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/catalog.rs - 类别名称表
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

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
#[error("无法读取类别文件 {path}: {source}")]
pub struct CatalogError {
  pub path: PathBuf,
  #[source]
  pub source: std::io::Error,
}

/// 按 `class_id` 索引的类别名称，启动时构建后只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCatalog {
  names: Vec<String>,
}

impl ClassCatalog {
  /// 每行一个名称，跳过空行
  pub fn parse(text: &str) -> Self {
    let names = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    Self { names }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError {
      path: path.to_path_buf(),
      source,
    })?;
    let catalog = Self::parse(&text);
    info!("从 {} 读取 {} 个类别", path.display(), catalog.len());
    Ok(catalog)
  }

  /// 读取失败时返回空表，由调用方决定是否终止
  pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
    Self::load(path).unwrap_or_else(|e| {
      warn!("{}", e);
      Self::default()
    })
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  /// 缺失时以编号代替名称
  pub fn label(&self, class_id: u32) -> String {
    self
      .name(class_id)
      .map(str::to_string)
      .unwrap_or_else(|| format!("#{}", class_id))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }
}

impl<S: Into<String>> FromIterator<S> for ClassCatalog {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}
