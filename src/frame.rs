// 该文件是 Shiyu （视域） 项目的一部分。
// src/frame.rs - 原始帧与输入张量定义
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

use std::sync::Arc;

pub const RGB_CHANNELS: usize = 3;
pub const PACKED_CHANNELS: usize = 4;

/// 采集端给出的像素格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  Rgba,
  Bgra,
  Argb,
  Abgr,
  Rgbx,
  Bgrx,
  Xrgb,
  Xbgr,
  /// 24 位紧凑 RGB，不是 32 位打包格式
  Rgb24,
  /// 双平面 YUV 4:2:0
  Nv12,
  /// 打包 YUV 4:2:2
  Yuyv,
}

impl PixelFormat {
  /// 32 位打包格式中 R、G、B 三个分量的字节偏移，非 32 位打包格式返回 `None`
  pub fn rgb_offsets(self) -> Option<[usize; RGB_CHANNELS]> {
    match self {
      PixelFormat::Rgba | PixelFormat::Rgbx => Some([0, 1, 2]),
      PixelFormat::Bgra | PixelFormat::Bgrx => Some([2, 1, 0]),
      PixelFormat::Argb | PixelFormat::Xrgb => Some([1, 2, 3]),
      PixelFormat::Abgr | PixelFormat::Xbgr => Some([3, 2, 1]),
      PixelFormat::Rgb24 | PixelFormat::Nv12 | PixelFormat::Yuyv => None,
    }
  }

  pub fn is_packed_32(self) -> bool {
    self.rgb_offsets().is_some()
  }

  pub fn from_name(name: &str) -> Option<Self> {
    let format = match name.to_ascii_lowercase().as_str() {
      "rgba" => PixelFormat::Rgba,
      "bgra" => PixelFormat::Bgra,
      "argb" => PixelFormat::Argb,
      "abgr" => PixelFormat::Abgr,
      "rgbx" => PixelFormat::Rgbx,
      "bgrx" => PixelFormat::Bgrx,
      "xrgb" => PixelFormat::Xrgb,
      "xbgr" => PixelFormat::Xbgr,
      "rgb" | "rgb24" => PixelFormat::Rgb24,
      "nv12" => PixelFormat::Nv12,
      "yuyv" => PixelFormat::Yuyv,
      _ => return None,
    };
    Some(format)
  }
}

/// 采集端交付的一帧原始图像
///
/// 数据不可变，克隆只增加引用计数。处理流程在一次同步处理结束后即释放它。
#[derive(Debug, Clone)]
pub struct RawFrame {
  width: u32,
  height: u32,
  format: PixelFormat,
  stride: usize,
  data: Arc<[u8]>,
}

impl RawFrame {
  pub fn new(
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: impl Into<Arc<[u8]>>,
  ) -> Self {
    Self {
      width,
      height,
      format,
      stride,
      data: data.into(),
    }
  }

  /// 按紧凑行宽（`width * 4`）构造 32 位打包帧
  pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
    let stride = width as usize * PACKED_CHANNELS;
    Self::new(width, height, format, stride, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }
}

/// 输入张量的数值编码
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorEncoding {
  /// 每个分量一个无符号字节
  Quantized,
  /// 每个分量一个 f32，按 `(raw - mean) / std` 归一化
  Float { mean: f32, std: f32 },
}

impl TensorEncoding {
  pub fn bytes_per_element(&self) -> usize {
    match self {
      TensorEncoding::Quantized => 1,
      TensorEncoding::Float { .. } => std::mem::size_of::<f32>(),
    }
  }

  pub fn is_quantized(&self) -> bool {
    matches!(self, TensorEncoding::Quantized)
  }
}

/// NHWC 布局、batch 为 1 的 RGB 输入张量
#[derive(Debug, Clone)]
pub struct InputTensor {
  width: u32,
  height: u32,
  encoding: TensorEncoding,
  data: Box<[u8]>,
}

impl InputTensor {
  pub fn byte_len_for(width: u32, height: u32, encoding: TensorEncoding) -> usize {
    width as usize * height as usize * RGB_CHANNELS * encoding.bytes_per_element()
  }

  pub(crate) fn from_parts(
    width: u32,
    height: u32,
    encoding: TensorEncoding,
    data: Vec<u8>,
  ) -> Self {
    debug_assert_eq!(data.len(), Self::byte_len_for(width, height, encoding));
    Self {
      width,
      height,
      encoding,
      data: data.into_boxed_slice(),
    }
  }

  pub fn height(&self) -> usize {
    self.height as usize
  }

  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn encoding(&self) -> TensorEncoding {
    self.encoding
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[u8]> for InputTensor {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}
