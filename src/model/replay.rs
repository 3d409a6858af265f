// 该文件是 Shiyu （视域） 项目的一部分。
// src/model/replay.rs - 回放推理运行时
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 从 JSON 夹具回放检测输出的推理运行时。
//!
//! 夹具描述模型输入形状、输出槽位数以及按调用顺序循环返回的候选列表，
//! 用于在没有真实推理设备的环境下驱动整条流水线：
//!
//! ```json
//! {
//!   "input": { "width": 300, "height": 300, "quantized": true },
//!   "max_detections": 10,
//!   "frames": [
//!     { "detections": [ { "bbox": [0.1, 0.2, 0.5, 0.6], "class": 0, "score": 0.9 } ] },
//!     { "fail": true }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{ConfigError, ThreadCount},
  frame::RGB_CHANNELS,
  model::{Interpreter, NUM_OUTPUTS, OUTPUT_BOXES, OUTPUT_CLASSES, OUTPUT_COUNT, OUTPUT_SCORES},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("夹具解析错误: {0}")]
  FixtureError(#[from] serde_json::Error),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输入字节数不匹配: 期望 {expected}, 实际 {actual}")]
  InputSize { expected: usize, actual: usize },
  #[error("输入尚未设置")]
  InputNotSet,
  #[error("回放第 {0} 帧时运行时报告失败")]
  Invoke(usize),
  #[error("输出索引越界: {0}")]
  OutputIndex(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayInput {
  pub width: u32,
  pub height: u32,
  #[serde(default = "default_quantized")]
  pub quantized: bool,
}

fn default_quantized() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDetection {
  /// `[y_min, x_min, y_max, x_max]`
  pub bbox: [f32; 4],
  pub class: f32,
  pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
  #[serde(default)]
  pub detections: Vec<ReplayDetection>,
  /// 覆盖报告的候选数量，缺省为 `detections.len()`
  #[serde(default)]
  pub count: Option<f32>,
  #[serde(default)]
  pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayFixture {
  pub input: ReplayInput,
  pub max_detections: usize,
  pub frames: Vec<ReplayFrame>,
}

impl ReplayFixture {
  fn validate(&self) -> Result<(), ReplayError> {
    if self.input.width == 0 || self.input.height == 0 {
      return Err(ReplayError::ModelInvalid(format!(
        "输入尺寸为零: {}x{}",
        self.input.width, self.input.height
      )));
    }
    if self.max_detections == 0 {
      return Err(ReplayError::ModelInvalid("输出槽位数为零".to_string()));
    }
    if self.frames.is_empty() {
      return Err(ReplayError::ModelInvalid("夹具中没有任何帧".to_string()));
    }
    if let Some((index, frame)) = self
      .frames
      .iter()
      .enumerate()
      .find(|(_, frame)| frame.detections.len() > self.max_detections)
    {
      return Err(ReplayError::ModelInvalid(format!(
        "第 {} 帧有 {} 个候选, 超过输出槽位数 {}",
        index,
        frame.detections.len(),
        self.max_detections
      )));
    }
    Ok(())
  }
}

pub struct ReplayInterpreter {
  fixture: ReplayFixture,
  thread_count: usize,
  cursor: usize,
  input: Option<Vec<u8>>,
  outputs: [Vec<f32>; NUM_OUTPUTS],
}

impl ReplayInterpreter {
  pub fn from_fixture(fixture: ReplayFixture, thread_count: usize) -> Result<Self, ReplayError> {
    fixture.validate()?;
    let slots = fixture.max_detections;
    Ok(Self {
      fixture,
      thread_count,
      cursor: 0,
      input: None,
      outputs: [
        vec![0.0; slots * 4],
        vec![0.0; slots],
        vec![0.0; slots],
        vec![0.0; 1],
      ],
    })
  }

  /// 已执行的推理次数
  pub fn invocations(&self) -> usize {
    self.cursor
  }

  fn fill_outputs(&mut self, frame_index: usize) {
    let frame = &self.fixture.frames[frame_index];
    for output in self.outputs.iter_mut() {
      output.iter_mut().for_each(|v| *v = 0.0);
    }
    for (i, detection) in frame.detections.iter().enumerate() {
      self.outputs[OUTPUT_BOXES][i * 4..i * 4 + 4].copy_from_slice(&detection.bbox);
      self.outputs[OUTPUT_CLASSES][i] = detection.class;
      self.outputs[OUTPUT_SCORES][i] = detection.score;
    }
    self.outputs[OUTPUT_COUNT][0] = frame
      .count
      .unwrap_or(frame.detections.len() as f32);
  }
}

impl Interpreter for ReplayInterpreter {
  type Error = ReplayError;

  fn input_size(&self) -> (u32, u32) {
    (self.fixture.input.width, self.fixture.input.height)
  }

  fn is_quantized(&self) -> bool {
    self.fixture.input.quantized
  }

  fn input_byte_len(&self) -> usize {
    let element = if self.fixture.input.quantized {
      1
    } else {
      std::mem::size_of::<f32>()
    };
    self.fixture.input.width as usize * self.fixture.input.height as usize * RGB_CHANNELS * element
  }

  fn thread_count(&self) -> usize {
    self.thread_count
  }

  fn copy_to_input(&mut self, data: &[u8]) -> Result<(), Self::Error> {
    let expected = self.input_byte_len();
    if data.len() != expected {
      return Err(ReplayError::InputSize {
        expected,
        actual: data.len(),
      });
    }
    let input = self.input.get_or_insert_with(Vec::new);
    input.clear();
    input.extend_from_slice(data);
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    if self.input.is_none() {
      return Err(ReplayError::InputNotSet);
    }
    let frame_index = self.cursor % self.fixture.frames.len();
    self.cursor += 1;
    if self.fixture.frames[frame_index].fail {
      return Err(ReplayError::Invoke(frame_index));
    }
    self.fill_outputs(frame_index);
    debug!("回放第 {} 帧输出", frame_index);
    Ok(())
  }

  fn output(&self, index: usize) -> Result<&[f32], Self::Error> {
    self
      .outputs
      .get(index)
      .map(Vec::as_slice)
      .ok_or(ReplayError::OutputIndex(index))
  }
}

pub struct ReplayInterpreterBuilder {
  model_path: String,
  thread_count: ThreadCount,
}

impl FromUrlWithScheme for ReplayInterpreterBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInterpreterBuilder {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = ReplayInterpreterBuilder {
      model_path: url.path().to_string(),
      thread_count: ThreadCount::default(),
    };
    if let Some((_, threads)) = url.query_pairs().find(|(k, _)| k == "threads") {
      let count = threads
        .parse::<usize>()
        .map_err(|_| ReplayError::ModelPathError(format!("无法解析线程数: {threads}")))?;
      builder = builder.thread_count(count)?;
    }
    Ok(builder)
  }
}

impl ReplayInterpreterBuilder {
  pub fn threads(&self) -> ThreadCount {
    self.thread_count
  }

  pub fn thread_count(mut self, count: usize) -> Result<Self, ReplayError> {
    self.thread_count = ThreadCount::new(count)?;
    Ok(self)
  }

  pub fn build(self) -> Result<ReplayInterpreter, ReplayError> {
    info!("加载模型文件: {}", self.model_path);
    let content = std::fs::read_to_string(&self.model_path)?;
    let fixture: ReplayFixture = serde_json::from_str(&content)?;
    debug!(
      "模型输入 {}x{}, 量化: {}, 输出槽位 {}",
      fixture.input.width, fixture.input.height, fixture.input.quantized, fixture.max_detections
    );
    let interpreter = ReplayInterpreter::from_fixture(fixture, self.thread_count.get())?;
    info!("模型加载完成, 线程数 {}", self.thread_count.get());
    Ok(interpreter)
  }
}
