// 该文件是 Shiyu （视域） 项目的一部分。
// src/geometry.rs - 矩形与坐标映射
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

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
  pub width: f32,
  pub height: f32,
}

impl Size {
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  fn is_positive(&self) -> bool {
    self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
  }
}

impl From<(u32, u32)> for Size {
  fn from((width, height): (u32, u32)) -> Self {
    Self::new(width as f32, height as f32)
  }
}

/// 左上角原点的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn max_x(&self) -> f32 {
    self.x + self.width
  }

  pub fn max_y(&self) -> f32 {
    self.y + self.height
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
  }

  /// 两个轴各自独立缩放
  pub fn scaled(&self, scale_x: f32, scale_y: f32) -> Self {
    Self::new(
      self.x * scale_x,
      self.y * scale_y,
      self.width * scale_x,
      self.height * scale_y,
    )
  }
}

/// 源图像坐标到视口坐标的映射
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  source: Size,
  viewport: Size,
  margin: f32,
}

impl CoordinateMapper {
  pub fn new(source: Size, viewport: Size, margin: f32) -> Self {
    Self {
      source,
      viewport,
      margin: margin.max(0.0),
    }
  }

  pub fn map(&self, rect: &Rect) -> Option<Rect> {
    map_to_viewport(rect, self.source, self.viewport, self.margin)
  }
}

/// 把源图像中的矩形映射到视口并裁剪到视口内
///
/// 宽高比不同时按轴非等比缩放。原点不小于 `margin`，超出视口右/下边界时
/// 尺寸收缩为 `viewport_edge - origin - margin`。源尺寸非正或矩形含非有限值时
/// 返回 `None`。
pub fn map_to_viewport(rect: &Rect, source: Size, viewport: Size, margin: f32) -> Option<Rect> {
  if !source.is_positive() || !rect.is_finite() {
    return None;
  }
  if !viewport.width.is_finite() || !viewport.height.is_finite() {
    return None;
  }

  let viewport = Size::new(viewport.width.max(0.0), viewport.height.max(0.0));
  let margin = margin.max(0.0);
  let scaled = rect.scaled(
    viewport.width / source.width,
    viewport.height / source.height,
  );

  let x = scaled.x.max(margin).min(viewport.width);
  let y = scaled.y.max(margin).min(viewport.height);

  let mut width = scaled.width.max(0.0);
  let mut height = scaled.height.max(0.0);
  if x + width > viewport.width {
    width = (viewport.width - x - margin).max(0.0);
  }
  if y + height > viewport.height {
    height = (viewport.height - y - margin).max(0.0);
  }

  Some(Rect::new(x, y, width, height))
}
