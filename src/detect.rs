// 该文件是 Shiyu （视域） 项目的一部分。
// src/detect.rs - 检测结果解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::geometry::Rect;
use crate::model::RawDetectionSet;

mod color;
mod label;

pub use self::color::{Color, DEFAULT_PALETTE, Palette};
pub use self::label::{LABEL_OFFSET, LabelError, LabelTable};

/// 一个检测到的目标，坐标为源图像像素
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub confidence: f32,
  pub label: String,
  pub rect: Rect,
  pub color: Color,
}

/// 一帧的推理结果，检测按置信度降序排列
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InferenceResult {
  pub inference_ms: f64,
  pub detections: Vec<Detection>,
}

impl InferenceResult {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("类别 {class_index} 没有对应标签（标签表共 {label_count} 行）")]
  LabelIndexOutOfRange { class_index: i64, label_count: usize },
  #[error("类别索引不是有限数: {0}")]
  InvalidClassIndex(f32),
}

pub struct DetectionDecoder {
  labels: LabelTable,
  threshold: f32,
  palette: Palette,
}

impl DetectionDecoder {
  pub fn new(labels: LabelTable, threshold: f32, palette: Palette) -> Self {
    Self {
      labels,
      threshold,
      palette,
    }
  }

  pub fn from_config(labels: LabelTable, config: &PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let palette = Palette::new(DEFAULT_PALETTE.to_vec(), config.color_stride)?;
    Ok(Self::new(labels, config.threshold, palette))
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn decode(
    &self,
    raw: &RawDetectionSet,
    image_width: f32,
    image_height: f32,
  ) -> Result<Vec<Detection>, DecodeError> {
    let count = raw.valid_count();
    if raw.count > count {
      warn!(
        "运行时报告 {} 个候选, 输出数组只能容纳 {} 个, 按 {} 处理",
        raw.count,
        raw.capacity(),
        count
      );
    }

    let mut detections = Vec::with_capacity(count);
    for i in 0..count {
      let score = raw.scores[i];
      if !(score >= self.threshold) {
        continue;
      }

      let class_value = raw.classes[i];
      if !class_value.is_finite() {
        error!("第 {} 个候选的类别索引无效: {}", i, class_value);
        return Err(DecodeError::InvalidClassIndex(class_value));
      }
      let class_index = class_value as i64;
      let Some(label_index) = self.labels.label_index(class_index) else {
        error!(
          "类别 {} 超出标签表范围 ({} 行), 模型与标签文件不匹配",
          class_index,
          self.labels.len()
        );
        return Err(DecodeError::LabelIndexOutOfRange {
          class_index,
          label_count: self.labels.len(),
        });
      };

      let [y_min, x_min, y_max, x_max] = [
        raw.boxes[4 * i],
        raw.boxes[4 * i + 1],
        raw.boxes[4 * i + 2],
        raw.boxes[4 * i + 3],
      ];
      let rect = Rect::new(
        x_min,
        y_min,
        (x_max - x_min).max(0.0),
        (y_max - y_min).max(0.0),
      )
      .scaled(image_width, image_height);
      if !rect.is_finite() {
        debug!("丢弃第 {} 个候选: 边框含非有限值 {:?}", i, rect);
        continue;
      }

      detections.push(Detection {
        confidence: score,
        label: self.labels.resolve(class_index).unwrap_or_default().to_string(),
        rect,
        color: self.palette.color_for(label_index),
      });
    }

    // 稳定排序, 置信度相同的保持原始候选顺序
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels() -> LabelTable {
    ["???", "person", "bicycle", "car"].into_iter().collect()
  }

  fn decoder() -> DetectionDecoder {
    DetectionDecoder::new(labels(), 0.5, Palette::default())
  }

  fn raw(candidates: &[([f32; 4], f32, f32)]) -> RawDetectionSet {
    let mut set = RawDetectionSet::default();
    for (bbox, class, score) in candidates {
      set.boxes.extend_from_slice(bbox);
      set.classes.push(*class);
      set.scores.push(*score);
    }
    set.count = candidates.len();
    set
  }

  #[test]
  fn filters_and_sorts_by_confidence() {
    let set = raw(&[
      ([0.0, 0.0, 0.5, 0.5], 0.0, 0.9),
      ([0.0, 0.0, 0.5, 0.5], 0.0, 0.4),
      ([0.0, 0.0, 0.5, 0.5], 1.0, 0.6),
    ]);
    let detections = decoder().decode(&set, 100.0, 100.0).unwrap();
    let scores: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
    assert_eq!(scores, vec![0.9, 0.6]);
    assert_eq!(detections[0].label, "person");
    assert_eq!(detections[1].label, "bicycle");
  }

  #[test]
  fn box_is_translated_and_scaled_per_axis() {
    let set = raw(&[([0.1, 0.2, 0.5, 0.6], 2.0, 0.8)]);
    let detections = decoder().decode(&set, 640.0, 480.0).unwrap();
    let rect = detections[0].rect;
    assert!((rect.x - 0.2 * 640.0).abs() < 1e-3);
    assert!((rect.y - 0.1 * 480.0).abs() < 1e-3);
    assert!((rect.width - 0.4 * 640.0).abs() < 1e-3);
    assert!((rect.height - 0.4 * 480.0).abs() < 1e-3);
    assert_eq!(detections[0].label, "car");
  }

  #[test]
  fn equal_scores_keep_candidate_order() {
    let set = raw(&[
      ([0.0, 0.0, 0.1, 0.1], 0.0, 0.7),
      ([0.0, 0.0, 0.2, 0.2], 1.0, 0.7),
      ([0.0, 0.0, 0.3, 0.3], 2.0, 0.8),
    ]);
    let detections = decoder().decode(&set, 1.0, 1.0).unwrap();
    let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["car", "person", "bicycle"]);
  }

  #[test]
  fn zero_count_yields_empty() {
    let mut set = raw(&[([0.0, 0.0, 0.1, 0.1], 0.0, 0.9)]);
    set.count = 0;
    assert!(decoder().decode(&set, 1.0, 1.0).unwrap().is_empty());
  }

  #[test]
  fn oversized_count_is_clamped_to_arrays() {
    let mut set = raw(&[([0.0, 0.0, 0.1, 0.1], 0.0, 0.9)]);
    set.count = 25;
    assert_eq!(decoder().decode(&set, 1.0, 1.0).unwrap().len(), 1);
  }

  #[test]
  fn unknown_class_is_a_contract_violation() {
    let set = raw(&[([0.0, 0.0, 0.1, 0.1], 7.0, 0.9)]);
    assert_eq!(
      decoder().decode(&set, 1.0, 1.0),
      Err(DecodeError::LabelIndexOutOfRange {
        class_index: 7,
        label_count: 4
      })
    );
  }

  #[test]
  fn below_threshold_unknown_class_is_ignored() {
    let set = raw(&[([0.0, 0.0, 0.1, 0.1], 7.0, 0.1)]);
    assert!(decoder().decode(&set, 1.0, 1.0).unwrap().is_empty());
  }

  #[test]
  fn color_follows_label_index() {
    let set = raw(&[([0.0, 0.0, 0.1, 0.1], 0.0, 0.9)]);
    let detections = decoder().decode(&set, 1.0, 1.0).unwrap();
    assert_eq!(detections[0].color, Palette::default().color_for(1));
  }
}
