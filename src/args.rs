// 该文件是 Shiyu （视域） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Args;
use tracing::info;
use url::Url;

use crate::{
  config::{
    ConfigError, DEFAULT_EDGE_MARGIN, DEFAULT_MIN_INTERVAL_MS, DEFAULT_THRESHOLD, PipelineConfig,
  },
  detect::LabelTable,
};

/// 各个可执行程序共用的参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 模型地址，例如 replay:///path/to/model.json?threads=2
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 标签文件，每行一个标签，第 0 行为占位
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 输入来源，例如 image:///path/to/frame.png?fps=30&format=bgra
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出，例如 image:///out.png、folder:///records?record 或 log://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 两次推理之间的最小间隔（毫秒）
  #[arg(long, default_value_t = DEFAULT_MIN_INTERVAL_MS, value_name = "MS")]
  pub interval: i64,

  /// 推理线程数 (1 - 10)，覆盖模型地址中的 threads 参数
  #[arg(long, value_name = "THREADS")]
  pub threads: Option<usize>,

  /// 叠加层距视口边缘的最小距离（像素）
  #[arg(long, default_value_t = DEFAULT_EDGE_MARGIN, value_name = "PIXELS")]
  pub edge_margin: f32,
}

impl PipelineArgs {
  pub fn log(&self) {
    info!("模型文件路径: {}", self.model);
    info!("标签文件路径: {}", self.labels.display());
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
  }

  pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default()
      .with_threshold(self.confidence)
      .with_min_interval_ms(self.interval)
      .with_edge_margin(self.edge_margin);
    if let Some(threads) = self.threads {
      config = config.with_thread_count(threads)?;
    }
    config.validate()?;
    Ok(config)
  }

  pub fn load_labels(&self) -> Result<LabelTable, crate::detect::LabelError> {
    LabelTable::from_file(&self.labels)
  }

  /// 按模型地址的方案构造回放运行时并组装流水线
  #[cfg(feature = "model_replay")]
  pub fn build_pipeline(
    &self,
  ) -> anyhow::Result<crate::pipeline::DetectionPipeline<crate::model::ReplayInterpreter>> {
    use crate::{FromUrl, model::ReplayInterpreterBuilder};

    let mut config = self.pipeline_config()?;
    let labels = self.load_labels()?;
    info!("加载 {} 个标签", labels.len());
    let mut builder = ReplayInterpreterBuilder::from_url(&self.model)?;
    if self.threads.is_some() {
      builder = builder.thread_count(config.thread_count.get())?;
    } else {
      config.thread_count = builder.threads();
    }
    let runtime = builder.build()?;
    Ok(crate::pipeline::DetectionPipeline::new(runtime, labels, &config)?)
  }
}
