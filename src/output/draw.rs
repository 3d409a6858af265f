// 该文件是 Shiyu （视域） 项目的一部分。
// src/output/draw.rs - 检测框叠加层
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

use serde::Serialize;

use crate::{
  config::DEFAULT_EDGE_MARGIN,
  detect::{Color, Detection, InferenceResult},
  frame::{PixelFormat, RGB_CHANNELS, RawFrame},
  geometry::{CoordinateMapper, Rect, Size},
};

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use image::{Rgb, RgbImage};

// 标签框排版常量
pub const LABEL_HORIZONTAL_SPACING: f32 = 13.0;
pub const LABEL_VERTICAL_SPACING: f32 = 7.0;
pub const BORDER_LINE_WIDTH: u32 = 3;
const LABEL_CHAR_WIDTH: f32 = 7.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_HEIGHT: f32 = 14.0;
const LABEL_BACKGROUND_ALPHA: f32 = 0.7;

/// 视口坐标下的一个待绘制目标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
  pub border: Rect,
  pub label_box: Rect,
  pub text: String,
  pub color: Color,
}

/// 标签文本 `"<label> <置信度百分比>"`
pub fn label_text(detection: &Detection) -> String {
  format!("{} {:.0}%", detection.label, detection.confidence * 100.0)
}

/// 由文本长度估算标签背景框，左上角与边框重合
pub fn label_box(border: &Rect, text: &str) -> Rect {
  let text_width = text.chars().count() as f32 * LABEL_CHAR_WIDTH;
  Rect::new(
    border.x,
    border.y,
    2.0 * LABEL_HORIZONTAL_SPACING + text_width,
    2.0 * LABEL_VERTICAL_SPACING + LABEL_TEXT_HEIGHT,
  )
}

/// 把一帧结果映射为视口中的叠加层；无法映射的检测被跳过
pub fn build_overlays(result: &InferenceResult, mapper: &CoordinateMapper) -> Vec<Overlay> {
  result
    .detections
    .iter()
    .filter_map(|detection| {
      let border = mapper.map(&detection.rect)?;
      let text = label_text(detection);
      Some(Overlay {
        label_box: label_box(&border, &text),
        border,
        text,
        color: detection.color,
      })
    })
    .collect()
}

/// 把原始帧还原成 RGB 图像，YUV 等格式返回 `None`
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
pub fn frame_to_image(frame: &RawFrame) -> Option<RgbImage> {
  let (width, height) = (frame.width(), frame.height());
  let (offsets, pixel_bytes) = match frame.format() {
    PixelFormat::Rgb24 => ([0, 1, 2], RGB_CHANNELS),
    format => (format.rgb_offsets()?, crate::frame::PACKED_CHANNELS),
  };
  let row_bytes = width as usize * pixel_bytes;
  if frame.stride() < row_bytes {
    return None;
  }
  let needed = frame.stride() * (height as usize).saturating_sub(1) + row_bytes;
  if height > 0 && frame.data().len() < needed {
    return None;
  }

  let data = frame.data();
  let stride = frame.stride();
  Some(RgbImage::from_fn(width, height, |x, y| {
    let base = y as usize * stride + x as usize * pixel_bytes;
    Rgb([
      data[base + offsets[0]],
      data[base + offsets[1]],
      data[base + offsets[2]],
    ])
  }))
}

/// 在图像上绘制检测框与半透明标签背景
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
#[derive(Debug, Clone)]
pub struct Draw {
  viewport: Option<(u32, u32)>,
  margin: f32,
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
impl Default for Draw {
  fn default() -> Self {
    Self {
      viewport: None,
      margin: DEFAULT_EDGE_MARGIN,
    }
  }
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
impl Draw {
  /// 输出图像缩放到指定视口尺寸；未指定时沿用源图像尺寸
  pub fn with_viewport(mut self, viewport: Option<(u32, u32)>) -> Self {
    self.viewport = viewport.filter(|(w, h)| *w > 0 && *h > 0);
    self
  }

  /// 叠加层距视口边缘的最小距离
  pub fn with_margin(mut self, margin: f32) -> Self {
    self.margin = margin.max(0.0);
    self
  }

  pub fn draw_result(&self, frame: &RawFrame, result: &InferenceResult) -> Option<RgbImage> {
    let source = frame_to_image(frame)?;
    let mut image = match self.viewport {
      Some((w, h)) if (w, h) != source.dimensions() => {
        image::imageops::resize(&source, w, h, image::imageops::FilterType::Triangle)
      }
      _ => source,
    };
    let mapper = CoordinateMapper::new(
      Size::from((frame.width(), frame.height())),
      Size::from(image.dimensions()),
      self.margin,
    );
    for overlay in build_overlays(result, &mapper) {
      draw_overlay(&mut image, &overlay);
    }
    Some(image)
  }
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
fn draw_overlay(image: &mut RgbImage, overlay: &Overlay) {
  use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as PixelRect};

  let color = Rgb(overlay.color.to_array());
  let x = overlay.border.x.floor() as i32;
  let y = overlay.border.y.floor() as i32;
  let width = overlay.border.width.round() as i32;
  let height = overlay.border.height.round() as i32;

  // 向内加粗
  for t in 0..BORDER_LINE_WIDTH as i32 {
    let (w, h) = (width - 2 * t, height - 2 * t);
    if w <= 0 || h <= 0 {
      break;
    }
    draw_hollow_rect_mut(
      image,
      PixelRect::at(x + t, y + t).of_size(w as u32, h as u32),
      color,
    );
  }

  blend_rect(image, &overlay.label_box, overlay.color, LABEL_BACKGROUND_ALPHA);
}

#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
fn blend_rect(image: &mut RgbImage, rect: &Rect, color: Color, alpha: f32) {
  let (w, h) = image.dimensions();
  let x0 = rect.x.max(0.0) as u32;
  let y0 = rect.y.max(0.0) as u32;
  let x1 = (rect.max_x().max(0.0) as u32).min(w);
  let y1 = (rect.max_y().max(0.0) as u32).min(h);
  let fill = color.to_array();

  for y in y0..y1 {
    for x in x0..x1 {
      let pixel = image.get_pixel_mut(x, y);
      for c in 0..RGB_CHANNELS {
        let blended = f32::from(fill[c]) * alpha + f32::from(pixel[c]) * (1.0 - alpha);
        pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
    Detection {
      confidence,
      label: "person".to_string(),
      rect: Rect::new(x, y, w, h),
      color: Color::rgb(255, 0, 0),
    }
  }

  #[test]
  fn text_uses_whole_percent() {
    assert_eq!(label_text(&detection(0.0, 0.0, 1.0, 1.0, 0.873)), "person 87%");
  }

  #[test]
  fn label_box_sits_on_border_origin() {
    let border = Rect::new(10.0, 20.0, 50.0, 50.0);
    let rect = label_box(&border, "ab");
    assert_eq!((rect.x, rect.y), (10.0, 20.0));
    assert_eq!(rect.width, 2.0 * 13.0 + 2.0 * LABEL_CHAR_WIDTH);
    assert_eq!(rect.height, 2.0 * 7.0 + LABEL_TEXT_HEIGHT);
  }

  #[test]
  fn overlays_are_mapped_into_viewport() {
    let result = InferenceResult {
      inference_ms: 1.0,
      detections: vec![
        detection(0.0, 0.0, 200.0, 100.0, 0.9),
        detection(150.0, 50.0, 100.0, 100.0, 0.8),
      ],
    };
    let mapper = CoordinateMapper::new(Size::new(200.0, 100.0), Size::new(100.0, 50.0), 2.0);
    let overlays = build_overlays(&result, &mapper);
    assert_eq!(overlays.len(), 2);
    for overlay in &overlays {
      assert!(overlay.border.x >= 0.0 && overlay.border.y >= 0.0);
      assert!(overlay.border.max_x() <= 100.0);
      assert!(overlay.border.max_y() <= 50.0);
    }
  }

  #[cfg(any(feature = "save_image_file", feature = "directory_record"))]
  #[test]
  fn bgra_frame_round_trips_to_rgb() {
    let frame = RawFrame::packed(1, 1, PixelFormat::Bgra, vec![3, 2, 1, 255]);
    let image = frame_to_image(&frame).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgb([1, 2, 3]));
  }

  #[cfg(any(feature = "save_image_file", feature = "directory_record"))]
  #[test]
  fn draw_paints_border_color() {
    let frame = RawFrame::packed(20, 20, PixelFormat::Rgba, vec![0; 20 * 20 * 4]);
    let result = InferenceResult {
      inference_ms: 0.0,
      detections: vec![detection(4.0, 4.0, 12.0, 12.0, 0.9)],
    };
    let image = Draw::default().draw_result(&frame, &result).unwrap();
    assert_eq!(image.get_pixel(15, 15), &Rgb([255, 0, 0]));
    assert_eq!(image.get_pixel(2, 2), &Rgb([0, 0, 0]));
  }

  #[cfg(any(feature = "save_image_file", feature = "directory_record"))]
  #[test]
  fn margin_pushes_border_off_the_edge() {
    let frame = RawFrame::packed(40, 40, PixelFormat::Rgba, vec![0; 40 * 40 * 4]);
    let result = InferenceResult {
      inference_ms: 0.0,
      detections: vec![detection(0.0, 30.0, 10.0, 10.0, 0.9)],
    };
    // 默认边距 2：边框从 (2, y) 开始
    let image = Draw::default().draw_result(&frame, &result).unwrap();
    assert_eq!(image.get_pixel(2, 35), &Rgb([255, 0, 0]));

    let image = Draw::default().with_margin(6.0).draw_result(&frame, &result).unwrap();
    assert_eq!(image.get_pixel(2, 35), &Rgb([0, 0, 0]));
    assert_eq!(image.get_pixel(6, 35), &Rgb([255, 0, 0]));
  }
}
