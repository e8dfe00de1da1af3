// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{
  thread,
  time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{info, warn};

use crate::{catalog::ClassCatalog, detector::Detect, frame::Frame, output::Render};

const WARMUP_RUNS: usize = 2;
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    model: M,
    output: O,
    catalog: &ClassCatalog,
  ) -> Result<(), Self::Error>;
}

/// 取一帧，检测一次
pub struct OneShotTask;

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Detect<Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    mut model: M,
    output: O,
    catalog: &ClassCatalog,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.detect(&frame.image, catalog)?;
    info!(
      "推理完成，检测到 {} 个目标，耗时: {:.2?}",
      result.detections.len(),
      now.elapsed()
    );
    for detection in &result.detections {
      info!(
        "{} {:.2} ({:.1}, {:.1}, {:.1}, {:.1})",
        catalog.label(detection.class_id),
        detection.confidence,
        detection.bbox.x,
        detection.bbox.y,
        detection.bbox.width,
        detection.bbox.height
      );
    }
    output.render_result(&frame, &result, catalog)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 同一帧重复检测，统计平均耗时（不计前两次预热）
#[derive(Debug)]
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

/// 去掉预热次数后的平均耗时
pub fn mean_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = times.get(WARMUP_RUNS..)?;
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Detect<Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    mut model: M,
    output: O,
    catalog: &ClassCatalog,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.detect(&frame.image, catalog)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result, catalog)?;
      info!("({})渲染完成，耗时: {:.2?}", i, now.elapsed());
      times.push(elapsed);
    }

    match mean_after_warmup(&times) {
      Some(mean) => warn!("平均推理时间: {:.2?}", mean),
      None => warn!("重复次数不足 {}，不统计平均推理时间", WARMUP_RUNS + 1),
    }

    Ok(())
  }
}

/// 持续处理输入直到输入结束、达到帧数上限或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: Detect<Error = ME>,
  O: Render<Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    mut model: M,
    output: O,
    catalog: &ClassCatalog,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;

    let mut processed = 0usize;
    let mut now = Instant::now();
    for frame in input {
      processed += 1;
      info!("处理第 {} 帧图像", frame.index);
      let result = model.detect(&frame.image, catalog)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result, catalog)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共处理 {} 帧，退出", processed);
    Ok(())
  }
}
