// 该文件是 Shiyu （视域） 项目的一部分。
// src/config.rs - 流水线配置
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

use thiserror::Error;

pub const THREAD_COUNT_LIMIT: usize = 10;
pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MIN_INTERVAL_MS: i64 = 200;
pub const DEFAULT_IMAGE_MEAN: f32 = 127.5;
pub const DEFAULT_IMAGE_STD: f32 = 127.5;
pub const DEFAULT_COLOR_STRIDE: i32 = 10;
pub const DEFAULT_EDGE_MARGIN: f32 = 2.0;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("线程数无效: {0}, 允许范围为 1..={THREAD_COUNT_LIMIT}")]
  InvalidThreadCount(usize),
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("最小推理间隔无效: {0} ms")]
  InvalidInterval(i64),
  #[error("归一化参数无效: mean={mean}, std={std}")]
  InvalidNormalization { mean: f32, std: f32 },
  #[error("调色板为空")]
  EmptyPalette,
  #[error("运行时线程数 {runtime} 与配置的线程数 {configured} 不一致")]
  ThreadCountMismatch { configured: usize, runtime: usize },
  #[error("视口边距无效: {0}")]
  InvalidEdgeMargin(f32),
}

/// 推理运行时线程数，构造时即校验
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCount(usize);

impl ThreadCount {
  pub fn new(count: usize) -> Result<Self, ConfigError> {
    if (1..=THREAD_COUNT_LIMIT).contains(&count) {
      Ok(Self(count))
    } else {
      Err(ConfigError::InvalidThreadCount(count))
    }
  }

  pub fn get(self) -> usize {
    self.0
  }
}

impl Default for ThreadCount {
  fn default() -> Self {
    Self(1)
  }
}

/// 流水线配置
///
/// 由会话持有并在构造时传入解码器与调度器，不存在进程级的全局状态。
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub thread_count: ThreadCount,
  pub threshold: f32,
  pub min_interval_ms: i64,
  pub image_mean: f32,
  pub image_std: f32,
  pub color_stride: i32,
  pub edge_margin: f32,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      thread_count: ThreadCount::default(),
      threshold: DEFAULT_THRESHOLD,
      min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
      image_mean: DEFAULT_IMAGE_MEAN,
      image_std: DEFAULT_IMAGE_STD,
      color_stride: DEFAULT_COLOR_STRIDE,
      edge_margin: DEFAULT_EDGE_MARGIN,
    }
  }
}

impl PipelineConfig {
  pub fn with_thread_count(mut self, count: usize) -> Result<Self, ConfigError> {
    self.thread_count = ThreadCount::new(count)?;
    Ok(self)
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_min_interval_ms(mut self, interval: i64) -> Self {
    self.min_interval_ms = interval;
    self
  }

  pub fn with_edge_margin(mut self, margin: f32) -> Self {
    self.edge_margin = margin;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.threshold) {
      return Err(ConfigError::InvalidThreshold(self.threshold));
    }
    if self.min_interval_ms < 0 {
      return Err(ConfigError::InvalidInterval(self.min_interval_ms));
    }
    if !self.image_mean.is_finite() || !self.image_std.is_finite() || self.image_std == 0.0 {
      return Err(ConfigError::InvalidNormalization {
        mean: self.image_mean,
        std: self.image_std,
      });
    }
    if !self.edge_margin.is_finite() || self.edge_margin < 0.0 {
      return Err(ConfigError::InvalidEdgeMargin(self.edge_margin));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn thread_count_bounds() {
    assert!(ThreadCount::new(1).is_ok());
    assert!(ThreadCount::new(10).is_ok());
    assert_eq!(ThreadCount::new(0), Err(ConfigError::InvalidThreadCount(0)));
    assert_eq!(
      ThreadCount::new(11),
      Err(ConfigError::InvalidThreadCount(11))
    );
  }

  #[test]
  fn defaults_validate() {
    let config = PipelineConfig::default();
    assert_eq!(config.thread_count.get(), 1);
    assert_eq!(config.min_interval_ms, 200);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn rejects_bad_threshold_and_std() {
    let config = PipelineConfig::default().with_threshold(1.5);
    assert_eq!(config.validate(), Err(ConfigError::InvalidThreshold(1.5)));

    let config = PipelineConfig {
      image_std: 0.0,
      ..PipelineConfig::default()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidNormalization { .. })
    ));

    let config = PipelineConfig::default().with_edge_margin(-1.0);
    assert_eq!(config.validate(), Err(ConfigError::InvalidEdgeMargin(-1.0)));
  }

  #[test]
  fn thread_count_builder_validates() {
    let config = PipelineConfig::default().with_thread_count(4).unwrap();
    assert_eq!(config.thread_count.get(), 4);
    assert!(PipelineConfig::default().with_thread_count(0).is_err());
  }
}
