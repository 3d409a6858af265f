// 该文件是 Shiyu （视域） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录结果
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

use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::InferenceResult,
  frame::{PixelFormat, RawFrame},
  output::{
    Render,
    draw::{Draw, frame_to_image},
    viewport_from_query,
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("无效的视口参数: {0}")]
  InvalidViewport(String),
  #[error("无法保存像素格式 {0:?}")]
  UnsupportedFormat(PixelFormat),
}

/// 保存方式：绘制叠加层，或保存原图并附带 JSON 记录
pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record,
}

impl DrawWrapper {
  pub fn save_result(
    &self,
    path: &Path,
    frame: &RawFrame,
    result: &InferenceResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        let image = draw
          .draw_result(frame, result)
          .ok_or(DirectoryRecordOutputError::UnsupportedFormat(frame.format()))?;
        image.save(path)?;
      }
      DrawWrapper::Record => {
        let image = frame_to_image(frame)
          .ok_or(DirectoryRecordOutputError::UnsupportedFormat(frame.format()))?;
        image.save(path)?;
        let record = serde_json::to_vec_pretty(result)?;
        std::fs::write(path.with_extension("json"), record)?;
      }
    };

    Ok(())
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU32,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let draw = if uri.query_pairs().any(|(k, _)| k == "record") {
      DrawWrapper::Record
    } else {
      let viewport = viewport_from_query(uri).map_err(DirectoryRecordOutputError::InvalidViewport)?;
      DrawWrapper::Draw(Box::new(Draw::default().with_viewport(viewport)))
    };
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw,
      frame_counter: AtomicU32::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  /// 仅影响绘制模式；记录模式保存原图
  pub fn with_edge_margin(mut self, margin: f32) -> Self {
    self.draw = match self.draw {
      DrawWrapper::Draw(draw) => DrawWrapper::Draw(Box::new((*draw).with_margin(margin))),
      DrawWrapper::Record => DrawWrapper::Record,
    };
    self
  }

  fn frame_id(&self) -> u32 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RawFrame, result: &InferenceResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("无检测结果, 跳过记录");
      return Ok(());
    }
    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result)?;
    debug!("记录结果到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{detect::Color, detect::Detection, geometry::Rect};

  fn result() -> InferenceResult {
    InferenceResult {
      inference_ms: 3.5,
      detections: vec![Detection {
        confidence: 0.9,
        label: "person".to_string(),
        rect: Rect::new(1.0, 1.0, 2.0, 2.0),
        color: Color::rgb(255, 0, 0),
      }],
    }
  }

  fn files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        out.extend(files(&path));
      } else {
        out.push(path);
      }
    }
    out
  }

  #[test]
  fn record_mode_writes_png_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let frame = RawFrame::packed(4, 4, PixelFormat::Rgba, vec![0; 64]);
    output.render_result(&frame, &result()).unwrap();

    let written = files(dir.path());
    assert_eq!(written.len(), 2);
    let json = written.iter().find(|p| p.extension().is_some_and(|e| e == "json")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(json).unwrap()).unwrap();
    assert_eq!(value["detections"][0]["label"], "person");
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let frame = RawFrame::packed(4, 4, PixelFormat::Rgba, vec![0; 64]);
    output.render_result(&frame, &InferenceResult::default()).unwrap();
    assert!(files(dir.path()).is_empty());

    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame, &InferenceResult::default()).unwrap();
    assert_eq!(files(dir.path()).len(), 1);
  }
}
