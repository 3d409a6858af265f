// 该文件是 Shiyu （视域） 项目的一部分。
// src/model.rs - 推理运行时与推理调用
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error};

use crate::config::{ConfigError, ThreadCount};
use crate::frame::InputTensor;

/// 模型输出槽位顺序，由模型输出图决定，不随调用变化
pub const OUTPUT_BOXES: usize = 0;
pub const OUTPUT_CLASSES: usize = 1;
pub const OUTPUT_SCORES: usize = 2;
pub const OUTPUT_COUNT: usize = 3;
pub const NUM_OUTPUTS: usize = 4;

/// 推理运行时句柄
///
/// 只有一个输入槽和四个按序排列的输出槽（框、类别、分数、数量）。
/// 句柄只在工作线程上访问。
pub trait Interpreter {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 模型输入宽高
  fn input_size(&self) -> (u32, u32);
  /// 输入张量是否为 u8 量化类型
  fn is_quantized(&self) -> bool;
  fn input_byte_len(&self) -> usize;
  fn thread_count(&self) -> usize;

  fn copy_to_input(&mut self, data: &[u8]) -> Result<(), Self::Error>;
  fn invoke(&mut self) -> Result<(), Self::Error>;
  fn output(&self, index: usize) -> Result<&[f32], Self::Error>;
}

/// 一次推理的原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetectionSet {
  /// 每个候选 4 个值: `[y_min, x_min, y_max, x_max]`，归一化到 [0, 1]
  pub boxes: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  /// 运行时报告的有效候选数
  pub count: usize,
}

impl RawDetectionSet {
  pub fn new(boxes: Vec<f32>, classes: Vec<f32>, scores: Vec<f32>, count: usize) -> Self {
    Self {
      boxes,
      classes,
      scores,
      count,
    }
  }

  /// 由输出张量中的浮点数解析候选数量，非法值视为 0
  pub fn count_from_f32(raw: f32) -> usize {
    if raw.is_finite() && raw > 0.0 {
      raw as usize
    } else {
      0
    }
  }

  /// 三个输出数组实际能容纳的候选数
  pub fn capacity(&self) -> usize {
    (self.boxes.len() / 4)
      .min(self.classes.len())
      .min(self.scores.len())
  }

  pub fn valid_count(&self) -> usize {
    self.count.min(self.capacity())
  }
}

#[derive(Error, Debug)]
pub enum InvokeError {
  #[error("输入张量大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  TensorSizeMismatch { expected: usize, actual: usize },
  #[error("推理失败: {0}")]
  InferenceFailed(String),
}

impl InvokeError {
  fn failed(err: impl std::error::Error) -> Self {
    InvokeError::InferenceFailed(err.to_string())
  }
}

/// 推理结果与耗时
#[derive(Debug, Clone)]
pub struct Invocation {
  pub detections: RawDetectionSet,
  pub elapsed_ms: f64,
}

pub struct InferenceInvoker<R> {
  runtime: R,
  thread_count: ThreadCount,
}

impl<R: Interpreter> InferenceInvoker<R> {
  pub fn new(runtime: R) -> Result<Self, ConfigError> {
    let thread_count = ThreadCount::new(runtime.thread_count())?;
    Ok(Self {
      runtime,
      thread_count,
    })
  }

  pub fn thread_count(&self) -> ThreadCount {
    self.thread_count
  }

  pub fn runtime(&self) -> &R {
    &self.runtime
  }

  pub fn invoke(&mut self, tensor: &InputTensor) -> Result<Invocation, InvokeError> {
    let expected = self.runtime.input_byte_len();
    if tensor.len() != expected {
      error!(
        "输入张量大小与模型不符: 期望 {} 字节, 实际 {} 字节",
        expected,
        tensor.len()
      );
      return Err(InvokeError::TensorSizeMismatch {
        expected,
        actual: tensor.len(),
      });
    }

    debug!("设置模型输入");
    self
      .runtime
      .copy_to_input(tensor.as_ref())
      .map_err(InvokeError::failed)?;

    debug!("执行模型推理");
    let now = Instant::now();
    self.runtime.invoke().map_err(InvokeError::failed)?;
    let elapsed_ms = now.elapsed().as_secs_f64() * 1000.0;

    debug!("获取模型输出");
    let boxes = self.read_output(OUTPUT_BOXES)?;
    let classes = self.read_output(OUTPUT_CLASSES)?;
    let scores = self.read_output(OUTPUT_SCORES)?;
    let count = self
      .runtime
      .output(OUTPUT_COUNT)
      .map_err(InvokeError::failed)?
      .first()
      .copied()
      .map(RawDetectionSet::count_from_f32)
      .unwrap_or(0);

    Ok(Invocation {
      detections: RawDetectionSet::new(boxes, classes, scores, count),
      elapsed_ms,
    })
  }

  fn read_output(&self, index: usize) -> Result<Vec<f32>, InvokeError> {
    self
      .runtime
      .output(index)
      .map(<[f32]>::to_vec)
      .map_err(InvokeError::failed)
  }
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{
  ReplayDetection, ReplayError, ReplayFixture, ReplayFrame, ReplayInput, ReplayInterpreter,
  ReplayInterpreterBuilder,
};
