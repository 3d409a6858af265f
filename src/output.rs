// 该文件是 Shiyu （视域） 项目的一部分。
// src/output.rs - 结果输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::detect::InferenceResult;
use crate::frame::RawFrame;
use thiserror::Error;
use url::Url;

pub trait Render: Sized {
  type Error;
  fn render_result(&self, frame: &RawFrame, result: &InferenceResult) -> Result<(), Self::Error>;
}

pub mod draw;

mod log_output;
pub use self::log_output::LogOutput;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError, DrawWrapper};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 从 `?width=..&height=..` 读取输出视口尺寸，两者需同时给出
pub fn viewport_from_query(url: &Url) -> Result<Option<(u32, u32)>, String> {
  let mut width = None;
  let mut height = None;
  for (key, value) in url.query_pairs() {
    let slot = match key.as_ref() {
      "width" => &mut width,
      "height" => &mut height,
      _ => continue,
    };
    let parsed = value
      .parse::<u32>()
      .ok()
      .filter(|v| *v > 0)
      .ok_or_else(|| format!("{key}={value}"))?;
    *slot = Some(parsed);
  }
  match (width, height) {
    (Some(w), Some(h)) => Ok(Some((w, h))),
    (None, None) => Ok(None),
    _ => Err("width 与 height 需同时指定".to_string()),
  }
}

pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  /// 设置绘制叠加层时距视口边缘的最小距离
  pub fn with_edge_margin(self, margin: f32) -> Self {
    match self {
      OutputWrapper::Log(output) => OutputWrapper::Log(output),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_edge_margin(margin))
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        OutputWrapper::DirectoryRecordOutput(output.with_edge_margin(margin))
      }
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RawFrame, result: &InferenceResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => match output.render_result(frame, result) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn viewport_needs_both_dimensions() {
    let url = Url::parse("image:///tmp/out.png?width=320&height=240").unwrap();
    assert_eq!(viewport_from_query(&url), Ok(Some((320, 240))));
    let url = Url::parse("image:///tmp/out.png?width=320").unwrap();
    assert!(viewport_from_query(&url).is_err());
    let url = Url::parse("image:///tmp/out.png").unwrap();
    assert_eq!(viewport_from_query(&url), Ok(None));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn log_scheme_selects_log_output() {
    let url = Url::parse("log://").unwrap();
    assert!(matches!(OutputWrapper::from_url(&url), Ok(OutputWrapper::Log(_))));
  }
}
