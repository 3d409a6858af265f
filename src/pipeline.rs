// 该文件是 Shiyu （视域） 项目的一部分。
// src/pipeline.rs - 单帧检测流水线
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

use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, PipelineConfig},
  convert::{ConvertError, PixelBufferConverter},
  detect::{DecodeError, DetectionDecoder, InferenceResult, LabelTable},
  frame::{RawFrame, TensorEncoding},
  model::{InferenceInvoker, Interpreter, InvokeError},
  scheduler::{Admission, InferenceScheduler},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("预处理错误: {0}")]
  Convert(#[from] ConvertError),
  #[error("推理错误: {0}")]
  Invoke(#[from] InvokeError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
}

/// 跨到展示端的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  UnsupportedFormat,
  ResizeFailure,
  InferenceFailed,
  TensorSizeMismatch,
  LabelIndexOutOfRange,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::UnsupportedFormat => "unsupported pixel format",
      ErrorKind::ResizeFailure => "resize failure",
      ErrorKind::InferenceFailed => "inference failed",
      ErrorKind::TensorSizeMismatch => "tensor size mismatch",
      ErrorKind::LabelIndexOutOfRange => "label index out of range",
    };
    f.write_str(name)
  }
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::Convert(ConvertError::UnsupportedFormat(_)) => ErrorKind::UnsupportedFormat,
      PipelineError::Convert(ConvertError::ResizeFailure(_)) => ErrorKind::ResizeFailure,
      PipelineError::Invoke(InvokeError::InferenceFailed(_)) => ErrorKind::InferenceFailed,
      PipelineError::Invoke(InvokeError::TensorSizeMismatch { .. }) => {
        ErrorKind::TensorSizeMismatch
      }
      PipelineError::Decode(_) => ErrorKind::LabelIndexOutOfRange,
    }
  }

  /// 单帧错误可恢复；模型、标签与预处理之间的契约错误不可恢复
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self.kind(),
      ErrorKind::UnsupportedFormat | ErrorKind::ResizeFailure | ErrorKind::InferenceFailed
    )
  }
}

#[derive(Debug, Clone)]
pub enum FrameOutcome {
  Dropped { elapsed_ms: i64 },
  Completed(Arc<InferenceResult>),
}

/// 调度 → 预处理 → 推理 → 解码
pub struct DetectionPipeline<R> {
  scheduler: InferenceScheduler,
  converter: PixelBufferConverter,
  invoker: InferenceInvoker<R>,
  decoder: DetectionDecoder,
}

impl<R: Interpreter> DetectionPipeline<R> {
  pub fn new(runtime: R, labels: LabelTable, config: &PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let invoker = InferenceInvoker::new(runtime)?;
    if invoker.thread_count() != config.thread_count {
      return Err(ConfigError::ThreadCountMismatch {
        configured: config.thread_count.get(),
        runtime: invoker.thread_count().get(),
      });
    }
    let (width, height) = invoker.runtime().input_size();
    let encoding = if invoker.runtime().is_quantized() {
      TensorEncoding::Quantized
    } else {
      TensorEncoding::Float {
        mean: config.image_mean,
        std: config.image_std,
      }
    };
    info!(
      "流水线: 输入 {}x{}, {:?}, 线程数 {}, 阈值 {}, 最小间隔 {} ms",
      width,
      height,
      encoding,
      invoker.thread_count().get(),
      config.threshold,
      config.min_interval_ms
    );

    Ok(Self {
      scheduler: InferenceScheduler::new(config.min_interval_ms),
      converter: PixelBufferConverter::new(width, height, encoding),
      invoker,
      decoder: DetectionDecoder::from_config(labels, config)?,
    })
  }

  pub fn scheduler(&self) -> &InferenceScheduler {
    &self.scheduler
  }

  pub fn runtime(&self) -> &R {
    self.invoker.runtime()
  }

  pub fn admit(&mut self, now_ms: i64) -> Admission {
    self.scheduler.admit(now_ms)
  }

  /// 经调度器判断后处理一帧
  pub fn process_frame(
    &mut self,
    frame: &RawFrame,
    now_ms: i64,
  ) -> Result<FrameOutcome, PipelineError> {
    if let Admission::Dropped { elapsed_ms } = self.admit(now_ms) {
      return Ok(FrameOutcome::Dropped { elapsed_ms });
    }
    let result = self.run(frame)?;
    Ok(FrameOutcome::Completed(Arc::new(result)))
  }

  /// 不经调度器直接处理一帧
  pub fn run(&mut self, frame: &RawFrame) -> Result<InferenceResult, PipelineError> {
    let tensor = self.converter.convert(frame)?;
    let invocation = self.invoker.invoke(&tensor)?;
    drop(tensor);
    let detections = self.decoder.decode(
      &invocation.detections,
      frame.width() as f32,
      frame.height() as f32,
    )?;
    debug!(
      "推理完成，耗时: {:.2} ms, {} 个检测",
      invocation.elapsed_ms,
      detections.len()
    );
    Ok(InferenceResult {
      inference_ms: invocation.elapsed_ms,
      detections,
    })
  }
}
