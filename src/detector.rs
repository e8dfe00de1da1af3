// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/detector.rs - 检测器门面
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

use std::{path::Path, sync::Arc, time::Instant};

use ab_glyph::FontArc;
use image::RgbImage;
use tracing::{debug, info};

use crate::{
  artifact::{self, Artifact},
  buffer::BufferPool,
  catalog::ClassCatalog,
  config::{BATCH_SIZE, CONF_THRESH, GPU_ID, INPUT_H, INPUT_W, MAX_DETECTIONS, NMS_THRESH},
  device::{Device, Stream},
  engine::{Binding, Engine},
  error::{DetectorError, UsageError},
  executor,
  output::draw::Draw,
  postprocess::{Detection, Postprocessor},
  preprocess::{ChannelOrder, Preprocessor},
};

/// 运行期可调的检测参数
#[derive(Clone)]
pub struct DetectorConfig {
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  pub channel_order: ChannelOrder,
  font: Option<FontArc>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: CONF_THRESH,
      nms_threshold: NMS_THRESH,
      channel_order: ChannelOrder::default(),
      font: None,
    }
  }
}

impl DetectorConfig {
  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
    self.channel_order = order;
    self
  }

  /// 标注时使用的字体，缺省时只画边框与标签底色
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }
}

/// 单帧检测结果
#[derive(Debug, Clone)]
pub struct DetectOutput {
  pub detections: Vec<Detection>,
  /// 画上边框与标签的帧副本
  pub annotated: RgbImage,
}

/// 任务层使用的检测接口
pub trait Detect {
  type Error;

  fn detect(
    &mut self,
    frame: &RgbImage,
    catalog: &ClassCatalog,
  ) -> Result<DetectOutput, Self::Error>;
}

// 字段顺序即释放顺序：缓冲区、网络、执行流
struct Resources<N, D: Device> {
  buffers: BufferPool<D>,
  network: N,
  bindings: Vec<Binding>,
  stream: Stream<D>,
}

enum DetectorState<N, D: Device> {
  Uninitialized,
  Ready(Box<Resources<N, D>>),
}

/// 组合模型加载、预处理、推理与后处理的检测器。
///
/// 初始化后独占所有设备资源，`detect` 需要 `&mut self`，同一组缓冲区上不会有两帧同时在途。
pub struct Detector<E: Engine, D: Device> {
  engine: E,
  device: Arc<D>,
  config: DetectorConfig,
  preprocessor: Preprocessor,
  postprocessor: Postprocessor,
  draw: Draw,
  state: DetectorState<E::Network, D>,
}

impl<E: Engine, D: Device> Detector<E, D> {
  pub fn new(engine: E, device: Arc<D>, config: DetectorConfig) -> Self {
    let preprocessor = Preprocessor::new(INPUT_W, INPUT_H, config.channel_order);
    let postprocessor = Postprocessor {
      confidence_threshold: config.confidence_threshold,
      nms_threshold: config.nms_threshold,
      max_records: MAX_DETECTIONS,
    };
    let draw = match &config.font {
      Some(font) => Draw::default().with_font(font.clone()),
      None => Draw::default(),
    };

    Self {
      engine,
      device,
      config,
      preprocessor,
      postprocessor,
      draw,
      state: DetectorState::Uninitialized,
    }
  }

  /// 选择设备、创建执行流、加载模型并分配缓冲区。
  ///
  /// 任一步失败时已获取的资源全部释放，检测器保持未初始化，可以重试。
  pub fn initialize(&mut self, path: impl AsRef<Path>) -> Result<(), DetectorError> {
    if self.is_ready() {
      return Err(UsageError::AlreadyInitialized.into());
    }

    let now = Instant::now();
    self.device.set_device(GPU_ID)?;
    let stream = Stream::create(&self.device)?;
    let Artifact { network, bindings } = artifact::load(&self.engine, path.as_ref())?;
    let buffers = BufferPool::allocate(&self.device, BATCH_SIZE)?;

    self.state = DetectorState::Ready(Box::new(Resources {
      buffers,
      network,
      bindings,
      stream,
    }));
    info!("检测器初始化完成，耗时: {:.2?}", now.elapsed());
    Ok(())
  }

  pub fn is_ready(&self) -> bool {
    matches!(self.state, DetectorState::Ready(_))
  }

  /// 检测一帧，并在帧的副本上画出结果
  pub fn detect(
    &mut self,
    frame: &RgbImage,
    catalog: &ClassCatalog,
  ) -> Result<DetectOutput, DetectorError> {
    let detections = self
      .detect_batch(std::slice::from_ref(frame))?
      .pop()
      .unwrap_or_default();

    let now = Instant::now();
    let annotated = self.draw.annotate(frame, &detections, catalog);
    debug!("绘制完成，耗时: {:.2?}", now.elapsed());

    Ok(DetectOutput {
      detections,
      annotated,
    })
  }

  /// 一次推理至多 `BATCH_SIZE` 帧，每帧占一个槽位，不做绘制
  pub fn detect_batch(
    &mut self,
    frames: &[RgbImage],
  ) -> Result<Vec<Vec<Detection>>, DetectorError> {
    let DetectorState::Ready(resources) = &mut self.state else {
      return Err(UsageError::NotInitialized.into());
    };
    let Resources {
      buffers,
      network,
      stream,
      ..
    } = &mut **resources;

    let batch = frames.len();
    if batch == 0 || batch > buffers.batch_size() {
      return Err(UsageError::BatchSize(batch, buffers.batch_size()).into());
    }

    let now = Instant::now();
    let mut transforms = Vec::with_capacity(batch);
    for (slot, frame) in frames.iter().enumerate() {
      let transform = self.preprocessor.write_slot(
        frame,
        buffers,
        slot,
        self.device.as_ref(),
        stream.id(),
      )?;
      transforms.push(transform);
    }
    let preprocessed = now.elapsed();

    executor::infer(
      &self.engine,
      network,
      self.device.as_ref(),
      buffers,
      batch,
      stream,
    )?;
    let inferred = now.elapsed();

    let results: Vec<Vec<Detection>> = transforms
      .iter()
      .enumerate()
      .map(|(slot, transform)| {
        self
          .postprocessor
          .process(buffers.output_slot(slot), transform)
      })
      .collect();

    info!(
      "检测到 {} 个目标，耗时: 预处理 {:.2?} / 推理 {:.2?} / 总计 {:.2?}",
      results.iter().map(Vec::len).sum::<usize>(),
      preprocessed,
      inferred - preprocessed,
      now.elapsed()
    );
    Ok(results)
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn device(&self) -> &Arc<D> {
    &self.device
  }

  pub fn buffers(&self) -> Option<&BufferPool<D>> {
    self.resources().map(|r| &r.buffers)
  }

  pub fn stream(&self) -> Option<&Stream<D>> {
    self.resources().map(|r| &r.stream)
  }

  pub fn network(&self) -> Option<&E::Network> {
    self.resources().map(|r| &r.network)
  }

  pub fn bindings(&self) -> Option<&[Binding]> {
    self.resources().map(|r| r.bindings.as_slice())
  }

  fn resources(&self) -> Option<&Resources<E::Network, D>> {
    match &self.state {
      DetectorState::Ready(resources) => Some(&**resources),
      DetectorState::Uninitialized => None,
    }
  }
}

impl<E: Engine, D: Device> Detect for Detector<E, D> {
  type Error = DetectorError;

  fn detect(
    &mut self,
    frame: &RgbImage,
    catalog: &ClassCatalog,
  ) -> Result<DetectOutput, Self::Error> {
    Detector::detect(self, frame, catalog)
  }
}

impl<E: Engine, D: Device> Drop for Detector<E, D> {
  fn drop(&mut self) {
    if self.is_ready() {
      debug!("释放检测器资源");
    }
  }
}
