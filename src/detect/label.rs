// 该文件是 Shiyu （视域） 项目的一部分。
// src/detect/label.rs - 标签表
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

use std::path::Path;

use thiserror::Error;
use tracing::info;

/// 模型类别 `k` 对应标签文件第 `k + 1` 行，第 0 行保留不用
pub const LABEL_OFFSET: i64 = 1;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 按行排列的标签表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl LabelTable {
  pub fn new(labels: Vec<String>) -> Self {
    Self { labels }
  }

  pub fn parse(contents: &str) -> Self {
    Self::new(contents.lines().map(String::from).collect())
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let shown = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: shown.clone(),
      source,
    })?;
    let table = Self::parse(&contents);
    if table.is_empty() {
      return Err(LabelError::Empty(shown));
    }
    info!("加载标签文件 {}: {} 个标签", shown, table.len());
    Ok(table)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  /// 模型类别对应的标签表下标
  pub fn label_index(&self, class_index: i64) -> Option<usize> {
    let index = usize::try_from(class_index.checked_add(LABEL_OFFSET)?).ok()?;
    (index < self.labels.len()).then_some(index)
  }

  pub fn resolve(&self, class_index: i64) -> Option<&str> {
    self
      .label_index(class_index)
      .map(|index| self.labels[index].as_str())
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self::new(iter.into_iter().map(Into::into).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn class_index_is_offset_by_one() {
    let labels: LabelTable = ["???", "person", "bicycle"].into_iter().collect();
    assert_eq!(labels.resolve(0), Some("person"));
    assert_eq!(labels.resolve(1), Some("bicycle"));
    assert_eq!(labels.resolve(-1), Some("???"));
    assert_eq!(labels.resolve(2), None);
    assert_eq!(labels.resolve(-2), None);
    assert_eq!(labels.resolve(i64::MAX), None);
  }

  #[test]
  fn parses_newline_delimited_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"???\r\nperson\nbicycle\n").unwrap();
    let labels = LabelTable::from_file(file.path()).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.resolve(0), Some("person"));
  }

  #[test]
  fn missing_or_empty_files_are_errors() {
    assert!(matches!(
      LabelTable::from_file("/nonexistent/labelmap.txt"),
      Err(LabelError::Io { .. })
    ));
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(
      LabelTable::from_file(file.path()),
      Err(LabelError::Empty(_))
    ));
  }
}
