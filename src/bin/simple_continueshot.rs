// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续检测
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
  task::{ContinuousTask, Task},
};

/// 瞭望连续检测（回放引擎，按清单输出检测记录，不运行真实网络）
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 最多处理的帧数，缺省时处理到输入结束
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let pipeline = args.pipeline.build()?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(
      pipeline.input,
      pipeline.detector,
      pipeline.output,
      &pipeline.catalog,
    )?;

  Ok(())
}
