// 该文件是 Shiyu （视域） 项目的一部分。
// src/detect/color.rs - 类别颜色分配
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

use crate::config::{ConfigError, DEFAULT_COLOR_STRIDE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Color {
  pub r: u8,
  pub g: u8,
  pub b: u8,
}

impl Color {
  pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
    Self { r, g, b }
  }

  pub fn to_array(self) -> [u8; 3] {
    [self.r, self.g, self.b]
  }

  /// 三个通道同时加上 `percent`% 的满量程，四舍五入后限制在 [0, 255]
  pub fn shifted(self, percent: i64) -> Self {
    let delta = percent.saturating_mul(255);
    let shift = |channel: u8| {
      let hundredths = i64::from(channel).saturating_mul(100).saturating_add(delta);
      hundredths.saturating_add(50).div_euclid(100).clamp(0, 255) as u8
    };
    Self::rgb(shift(self.r), shift(self.g), shift(self.b))
  }
}

pub const DEFAULT_PALETTE: [Color; 10] = [
  Color::rgb(255, 0, 0),     // 红
  Color::rgb(90, 200, 250),  // 浅蓝
  Color::rgb(0, 255, 0),     // 绿
  Color::rgb(255, 128, 0),   // 橙
  Color::rgb(0, 0, 255),     // 蓝
  Color::rgb(128, 0, 128),   // 紫
  Color::rgb(255, 0, 255),   // 品红
  Color::rgb(255, 255, 0),   // 黄
  Color::rgb(0, 255, 255),   // 青
  Color::rgb(153, 102, 51),  // 棕
];

/// 基础调色板加亮度步长
///
/// 同一基础色在每轮循环中亮度递减一个步长，使别名到同一基础色的类别可区分。
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
  colors: Vec<Color>,
  stride: i64,
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      colors: DEFAULT_PALETTE.to_vec(),
      stride: i64::from(DEFAULT_COLOR_STRIDE),
    }
  }
}

impl Palette {
  pub fn new(colors: Vec<Color>, stride: i32) -> Result<Self, ConfigError> {
    if colors.is_empty() {
      return Err(ConfigError::EmptyPalette);
    }
    Ok(Self {
      colors,
      stride: i64::from(stride),
    })
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  pub fn color_for(&self, index: usize) -> Color {
    let len = self.colors.len();
    let base = self.colors[index % len];
    let cycle = i64::try_from(index / len).unwrap_or(i64::MAX);
    let percent = (self.stride / 2).saturating_sub(cycle).saturating_mul(self.stride);
    base.shifted(percent)
  }
}
