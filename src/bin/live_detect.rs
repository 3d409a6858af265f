// 该文件是 Shiyu （视域） 项目的一部分。
// src/bin/live_detect.rs - 实时检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shiyu::{
  FromUrl,
  args::PipelineArgs,
  input::InputWrapper,
  output::OutputWrapper,
  task::{LiveTask, Task},
};

/// Shiyu 实时检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub pipeline: PipelineArgs,

  /// 收到指定数量的结果后退出
  #[arg(long, value_name = "RESULT_NUMBER")]
  pub result_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  args.pipeline.log();
  info!("最小推理间隔: {} ms", args.pipeline.interval);

  let config = args.pipeline.pipeline_config()?;
  let pipeline = args.pipeline.build_pipeline()?;
  let input = InputWrapper::from_url(&args.pipeline.input)?;
  let output = OutputWrapper::from_url(&args.pipeline.output)?.with_edge_margin(config.edge_margin);

  LiveTask::default()
    .with_result_number(args.result_number)
    .run_task(input, pipeline, output)?;

  Ok(())
}
