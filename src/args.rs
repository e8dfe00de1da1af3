// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/args.rs - 命令行参数与检测流水线装配
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  catalog::ClassCatalog,
  config::{CONF_THRESH, NMS_THRESH},
  detector::{Detector, DetectorConfig},
  device::HostDevice,
  engine::ReplayEngine,
  input::InputWrapper,
  output::{OutputWrapper, draw::Draw},
  preprocess::ChannelOrder,
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug)]
pub struct PipelineArgs {
  /// 回放清单文件路径（JSON），内置的回放引擎按清单输出检测记录，不运行真实网络
  #[arg(long, value_name = "MODEL")]
  pub model: PathBuf,
  /// 类别名称文件，每行一个
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 输入来源，`image://<文件>` 或 `folder://<目录>`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，`image://<文件>` 或 `folder://<目录>[?always][&record]`
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = CONF_THRESH, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = NMS_THRESH, value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 网络按 BGR 顺序接收输入
  #[arg(long)]
  pub bgr: bool,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

/// 装配完成、可以交给任务执行的流水线
pub struct Pipeline {
  pub input: InputWrapper,
  pub detector: Detector<ReplayEngine, HostDevice>,
  pub output: Option<OutputWrapper>,
  pub catalog: ClassCatalog,
}

impl PipelineArgs {
  pub fn detector_config(&self) -> anyhow::Result<DetectorConfig> {
    let mut config = DetectorConfig::default()
      .with_confidence_threshold(self.confidence)
      .with_nms_threshold(self.nms_threshold);
    if self.bgr {
      config = config.with_channel_order(ChannelOrder::Bgr);
    }
    if let Some(path) = &self.font {
      let font = Draw::load_font(path)?;
      config = config.with_font(font);
    }
    Ok(config)
  }

  /// 在处理任何帧之前加载全部资源，失败时错误信息指明出错的资源
  pub fn build(&self) -> anyhow::Result<Pipeline> {
    info!("模型文件路径: {}", self.model.display());
    info!("类别文件路径: {}", self.labels.display());
    info!("输入来源: {}", self.input);
    if let Some(output) = &self.output {
      info!("输出路径: {}", output);
    }

    let catalog = ClassCatalog::load(&self.labels)
      .with_context(|| format!("无法加载类别文件: {}", self.labels.display()))?;

    let mut detector = Detector::new(
      ReplayEngine,
      Arc::new(HostDevice::new()),
      self.detector_config()?,
    );
    detector
      .initialize(&self.model)
      .with_context(|| format!("无法加载模型: {}", self.model.display()))?;

    let input = InputWrapper::from_url(&self.input)
      .with_context(|| format!("无法打开输入: {}", self.input))?;
    let output = self
      .output
      .as_ref()
      .map(|url| {
        OutputWrapper::from_url(url).with_context(|| format!("无法打开输出: {}", url))
      })
      .transpose()?;

    Ok(Pipeline {
      input,
      detector,
      output,
      catalog,
    })
  }
}
