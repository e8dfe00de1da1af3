// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复检测同一帧以统计耗时
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

use anyhow::Result;
use clap::Parser;

use liaowang::{
  args::PipelineArgs,
  task::{RepeatShotTask, Task},
};

/// 瞭望流水线耗时测试（回放引擎，不运行真实网络，只统计预处理与后处理开销）
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 重复次数，前两次作为预热不计入平均值
  #[arg(long, default_value_t = 1000, value_name = "COUNT")]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let pipeline = args.pipeline.build()?;

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(
      pipeline.input,
      pipeline.detector,
      pipeline.output,
      &pipeline.catalog,
    )?;

  Ok(())
}
