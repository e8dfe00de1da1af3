// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/artifact.rs - 模型文件加载与绑定校验
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
use tracing::{debug, error, info};

use crate::{
  config::{
    INPUT_BINDING_INDEX, INPUT_SIZE, INPUT_TENSOR_NAME, OUTPUT_BINDING_INDEX, OUTPUT_SIZE,
    OUTPUT_TENSOR_NAME,
  },
  engine::{Binding, Engine, EngineError},
};

const EXPECTED_BINDINGS: usize = 2;

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("模型路径不能为空")]
  EmptyPath,
  #[error("无法读取模型文件 {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型文件为空: {0}")]
  EmptyFile(PathBuf),
  #[error("模型反序列化失败 {path}: {source}")]
  Deserialize {
    path: PathBuf,
    #[source]
    source: EngineError,
  },
  #[error("预期绑定数量为 {expected}, 实际为 {actual}")]
  BindingCount { expected: usize, actual: usize },
  #[error("缺少绑定: {0}")]
  MissingBinding(&'static str),
  #[error("绑定 {name} 的索引应为 {expected}, 实际为 {actual}")]
  BindingIndex {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("绑定 {0} 的方向不符")]
  BindingDirection(&'static str),
  #[error("绑定 {name} 的大小应为 {expected}, 实际为 {actual}")]
  BindingShape {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
}

/// 反序列化完成且绑定已校验的网络
pub struct Artifact<N> {
  pub network: N,
  pub bindings: Vec<Binding>,
}

/// 读取并反序列化模型文件
pub fn load<E: Engine>(engine: &E, path: &Path) -> Result<Artifact<E::Network>, ArtifactError> {
  if path.as_os_str().is_empty() {
    error!("模型路径不能为空");
    return Err(ArtifactError::EmptyPath);
  }

  info!("加载模型文件: {}", path.display());
  let blob = std::fs::read(path).map_err(|source| ArtifactError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  if blob.is_empty() {
    return Err(ArtifactError::EmptyFile(path.to_path_buf()));
  }
  debug!(
    "模型文件大小: {:.2} MB",
    blob.len() as f64 / (1024.0 * 1024.0)
  );

  info!("反序列化网络并创建执行上下文");
  let network = engine
    .deserialize(&blob)
    .map_err(|source| ArtifactError::Deserialize {
      path: path.to_path_buf(),
      source,
    })?;

  let bindings = engine.bindings(&network);
  for binding in &bindings {
    debug!("模型绑定: {}", binding);
  }
  validate_bindings(&bindings)?;
  info!("模型加载完成");

  Ok(Artifact { network, bindings })
}

/// 校验网络恰好有一个输入和一个输出，且索引与大小与缓冲区常量一致
pub fn validate_bindings(bindings: &[Binding]) -> Result<(), ArtifactError> {
  if bindings.len() != EXPECTED_BINDINGS {
    error!(
      "预期绑定数量为 {}, 实际为 {}",
      EXPECTED_BINDINGS,
      bindings.len()
    );
    return Err(ArtifactError::BindingCount {
      expected: EXPECTED_BINDINGS,
      actual: bindings.len(),
    });
  }

  check_binding(bindings, INPUT_TENSOR_NAME, INPUT_BINDING_INDEX, true, INPUT_SIZE)?;
  check_binding(bindings, OUTPUT_TENSOR_NAME, OUTPUT_BINDING_INDEX, false, OUTPUT_SIZE)?;
  Ok(())
}

fn check_binding(
  bindings: &[Binding],
  name: &'static str,
  index: usize,
  is_input: bool,
  volume: usize,
) -> Result<(), ArtifactError> {
  let binding = bindings
    .iter()
    .find(|b| b.name == name)
    .ok_or(ArtifactError::MissingBinding(name))?;

  if binding.index != index {
    return Err(ArtifactError::BindingIndex {
      name,
      expected: index,
      actual: binding.index,
    });
  }
  if binding.is_input != is_input {
    return Err(ArtifactError::BindingDirection(name));
  }
  if binding.volume() != volume {
    return Err(ArtifactError::BindingShape {
      name,
      expected: volume,
      actual: binding.volume(),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;
  use crate::engine::{ReplayEngine, ReplayManifest};

  fn standard_bindings() -> Vec<Binding> {
    ReplayManifest::standard(Vec::new()).bindings
  }

  #[test]
  fn standard_bindings_pass() {
    validate_bindings(&standard_bindings()).unwrap();
  }

  #[test]
  fn extra_binding_is_rejected() {
    let mut bindings = standard_bindings();
    bindings.push(Binding {
      name: "extra".to_string(),
      index: 2,
      shape: vec![1],
      is_input: false,
    });
    assert!(matches!(
      validate_bindings(&bindings),
      Err(ArtifactError::BindingCount {
        expected: 2,
        actual: 3
      })
    ));
  }

  #[test]
  fn swapped_indices_are_rejected() {
    let mut bindings = standard_bindings();
    bindings[0].index = 1;
    bindings[1].index = 0;
    assert!(matches!(
      validate_bindings(&bindings),
      Err(ArtifactError::BindingIndex {
        name: INPUT_TENSOR_NAME,
        expected: 0,
        actual: 1
      })
    ));
  }

  #[test]
  fn renamed_output_is_missing() {
    let mut bindings = standard_bindings();
    bindings[1].name = "output0".to_string();
    assert!(matches!(
      validate_bindings(&bindings),
      Err(ArtifactError::MissingBinding(OUTPUT_TENSOR_NAME))
    ));
  }

  #[test]
  fn wrong_output_volume_is_rejected() {
    let mut bindings = standard_bindings();
    bindings[1].shape = vec![OUTPUT_SIZE - 1];
    assert!(matches!(
      validate_bindings(&bindings),
      Err(ArtifactError::BindingShape { .. })
    ));
  }

  #[test]
  fn empty_path_is_rejected() {
    assert!(matches!(
      load(&ReplayEngine, Path::new("")),
      Err(ArtifactError::EmptyPath)
    ));
  }

  #[test]
  fn missing_file_names_the_path() {
    let err = load(&ReplayEngine, Path::new("/nonexistent/model.engine"))
      .err()
      .unwrap();
    assert!(matches!(err, ArtifactError::Read { .. }));
    assert!(err.to_string().contains("/nonexistent/model.engine"));
  }

  #[test]
  fn garbage_blob_fails_to_deserialize() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"\x00\x01garbage").unwrap();
    assert!(matches!(
      load(&ReplayEngine, file.path()),
      Err(ArtifactError::Deserialize { .. })
    ));
  }

  #[test]
  fn replay_manifest_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file
      .write_all(&ReplayManifest::standard(Vec::new()).to_bytes().unwrap())
      .unwrap();
    let artifact = load(&ReplayEngine, file.path()).unwrap();
    assert_eq!(artifact.bindings.len(), 2);
  }
}
