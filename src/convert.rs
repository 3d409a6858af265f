// 该文件是 Shiyu （视域） 项目的一部分。
// src/convert.rs - 像素缓冲转换：缩放、去 alpha、数值编码
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

use std::borrow::Cow;

use fast_image_resize as fr;
use thiserror::Error;
use tracing::debug;

use crate::frame::{InputTensor, PACKED_CHANNELS, PixelFormat, RGB_CHANNELS, RawFrame, TensorEncoding};

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("不支持的像素格式: {0:?}")]
  UnsupportedFormat(PixelFormat),
  #[error("缩放失败: {0}")]
  ResizeFailure(String),
}

impl ConvertError {
  fn resize(msg: impl std::fmt::Display) -> Self {
    ConvertError::ResizeFailure(msg.to_string())
  }
}

/// 把任意 32 位打包格式的帧转换为模型输入张量
///
/// 缩放是拉伸而非加黑边，源图宽高比与模型输入不一致时图像会变形。
pub struct PixelBufferConverter {
  width: u32,
  height: u32,
  encoding: TensorEncoding,
  resizer: fr::Resizer,
}

impl PixelBufferConverter {
  pub fn new(width: u32, height: u32, encoding: TensorEncoding) -> Self {
    Self {
      width,
      height,
      encoding,
      resizer: fr::Resizer::new(),
    }
  }

  pub fn target_size(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  pub fn encoding(&self) -> TensorEncoding {
    self.encoding
  }

  pub fn tensor_byte_len(&self) -> usize {
    InputTensor::byte_len_for(self.width, self.height, self.encoding)
  }

  pub fn convert(&mut self, frame: &RawFrame) -> Result<InputTensor, ConvertError> {
    let offsets = frame
      .format()
      .rgb_offsets()
      .ok_or(ConvertError::UnsupportedFormat(frame.format()))?;

    // 中间缓冲只活到本函数结束
    let scaled = self.resize(frame)?;
    let rgb = pack_rgb(&scaled, offsets);
    drop(scaled);

    let data = match self.encoding {
      TensorEncoding::Quantized => rgb,
      TensorEncoding::Float { mean, std } => normalize(&rgb, mean, std),
    };

    debug!(
      "输入张量: {}x{}x{} ({} 字节)",
      self.width,
      self.height,
      RGB_CHANNELS,
      data.len()
    );

    Ok(InputTensor::from_parts(
      self.width,
      self.height,
      self.encoding,
      data,
    ))
  }

  fn resize(&mut self, frame: &RawFrame) -> Result<Vec<u8>, ConvertError> {
    let (src_w, src_h) = (frame.width(), frame.height());
    if src_w == 0 || src_h == 0 || self.width == 0 || self.height == 0 {
      return Err(ConvertError::resize(format!(
        "尺寸为零: 源 {}x{}, 目标 {}x{}",
        src_w, src_h, self.width, self.height
      )));
    }

    let packed = compact_rows(frame)?;
    let src = fr::images::ImageRef::new(src_w, src_h, &packed, fr::PixelType::U8x4)
      .map_err(|e| ConvertError::resize(format!("无法创建缩放源图像: {e}")))?;

    let scratch_len = self.width as usize * self.height as usize * PACKED_CHANNELS;
    let mut scratch = Vec::new();
    scratch
      .try_reserve_exact(scratch_len)
      .map_err(|e| ConvertError::resize(format!("无法分配 {scratch_len} 字节缩放缓冲: {e}")))?;
    scratch.resize(scratch_len, 0u8);

    let mut dst = fr::images::Image::from_vec_u8(self.width, self.height, scratch, fr::PixelType::U8x4)
      .map_err(|e| ConvertError::resize(format!("无法创建缩放目标图像: {e}")))?;

    // 第四通道的位置因格式而异，不能按 alpha 预乘
    let options = fr::ResizeOptions::new()
      .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear))
      .use_alpha(false);
    self
      .resizer
      .resize(&src, &mut dst, Some(&options))
      .map_err(|e| ConvertError::resize(format!("缩放内核错误: {e}")))?;

    Ok(dst.into_vec())
  }
}

/// 去掉行尾填充，得到 `width * 4` 行宽的紧凑缓冲
fn compact_rows(frame: &RawFrame) -> Result<Cow<'_, [u8]>, ConvertError> {
  let row_bytes = frame.width() as usize * PACKED_CHANNELS;
  let height = frame.height() as usize;
  let stride = frame.stride();
  let data = frame.data();

  if stride < row_bytes {
    return Err(ConvertError::resize(format!(
      "行跨度 {stride} 小于行字节数 {row_bytes}"
    )));
  }

  let required = stride * (height - 1) + row_bytes;
  if data.len() < required {
    return Err(ConvertError::resize(format!(
      "源缓冲过短: 需要 {required} 字节, 实际 {} 字节",
      data.len()
    )));
  }

  if stride == row_bytes {
    return Ok(Cow::Borrowed(&data[..row_bytes * height]));
  }

  let mut packed = Vec::with_capacity(row_bytes * height);
  for row in data.chunks(stride).take(height) {
    packed.extend_from_slice(&row[..row_bytes]);
  }
  Ok(Cow::Owned(packed))
}

/// 丢弃第四通道并按 `offsets` 重排为 RGB
pub fn pack_rgb(packed: &[u8], offsets: [usize; RGB_CHANNELS]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(packed.len() / PACKED_CHANNELS * RGB_CHANNELS);
  for pixel in packed.chunks_exact(PACKED_CHANNELS) {
    rgb.push(pixel[offsets[0]]);
    rgb.push(pixel[offsets[1]]);
    rgb.push(pixel[offsets[2]]);
  }
  rgb
}

/// 按 `(value - mean) / std` 转为 f32，并以本机字节序写出
pub fn normalize(rgb: &[u8], mean: f32, std: f32) -> Vec<u8> {
  let mut out = Vec::with_capacity(rgb.len() * std::mem::size_of::<f32>());
  for &value in rgb {
    let sample = (f32::from(value) - mean) / std;
    out.extend_from_slice(&sample.to_ne_bytes());
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const FLOAT: TensorEncoding = TensorEncoding::Float {
    mean: 127.5,
    std: 127.5,
  };

  fn uniform_frame(width: u32, height: u32, format: PixelFormat, rgb: [u8; 3]) -> RawFrame {
    let [r_at, g_at, b_at] = format.rgb_offsets().unwrap();
    let mut pixel = [0xFFu8; 4];
    pixel[r_at] = rgb[0];
    pixel[g_at] = rgb[1];
    pixel[b_at] = rgb[2];
    let data = pixel.repeat(width as usize * height as usize);
    RawFrame::packed(width, height, format, data)
  }

  fn close(a: u8, b: u8) -> bool {
    a.abs_diff(b) <= 1
  }

  #[test]
  fn pack_rgb_permutes_each_layout() {
    let pixel = [10u8, 20, 30, 40];
    assert_eq!(pack_rgb(&pixel, PixelFormat::Rgba.rgb_offsets().unwrap()), [10, 20, 30]);
    assert_eq!(pack_rgb(&pixel, PixelFormat::Bgra.rgb_offsets().unwrap()), [30, 20, 10]);
    assert_eq!(pack_rgb(&pixel, PixelFormat::Argb.rgb_offsets().unwrap()), [20, 30, 40]);
    assert_eq!(pack_rgb(&pixel, PixelFormat::Abgr.rgb_offsets().unwrap()), [40, 30, 20]);
  }

  #[test]
  fn normalize_maps_byte_range_to_unit_interval() {
    let bytes = normalize(&[0, 255], 127.5, 127.5);
    let low = f32::from_ne_bytes(bytes[0..4].try_into().unwrap());
    let high = f32::from_ne_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(low, -1.0);
    assert_eq!(high, 1.0);
  }

  #[test]
  fn all_packed_layouts_normalize_to_the_same_rgb() {
    let expected = [200u8, 100, 50];
    for format in [
      PixelFormat::Rgba,
      PixelFormat::Bgra,
      PixelFormat::Argb,
      PixelFormat::Abgr,
      PixelFormat::Bgrx,
      PixelFormat::Xrgb,
    ] {
      let frame = uniform_frame(64, 48, format, expected);
      let mut converter = PixelBufferConverter::new(16, 16, TensorEncoding::Quantized);
      let tensor = converter.convert(&frame).unwrap();
      assert_eq!(tensor.len(), 16 * 16 * 3);
      for pixel in tensor.as_ref().chunks_exact(3) {
        assert!(
          close(pixel[0], 200) && close(pixel[1], 100) && close(pixel[2], 50),
          "{format:?}: {pixel:?}"
        );
      }
    }
  }

  #[test]
  fn float_mode_emits_four_bytes_per_sample() {
    let frame = uniform_frame(30, 20, PixelFormat::Bgra, [255, 255, 255]);
    let mut converter = PixelBufferConverter::new(10, 10, FLOAT);
    let tensor = converter.convert(&frame).unwrap();
    assert_eq!(tensor.len(), 10 * 10 * 3 * 4);
    let first = f32::from_ne_bytes(tensor.as_ref()[0..4].try_into().unwrap());
    assert!((first - 1.0).abs() < 0.02);
  }

  #[test]
  fn padded_rows_are_compacted() {
    let width = 8u32;
    let height = 4u32;
    let stride = width as usize * 4 + 16;
    let mut data = vec![0u8; stride * height as usize];
    for row in data.chunks_mut(stride) {
      for pixel in row[..width as usize * 4].chunks_exact_mut(4) {
        pixel.copy_from_slice(&[7, 8, 9, 255]);
      }
    }
    let frame = RawFrame::new(width, height, PixelFormat::Rgba, stride, data);
    let mut converter = PixelBufferConverter::new(4, 2, TensorEncoding::Quantized);
    let tensor = converter.convert(&frame).unwrap();
    for pixel in tensor.as_ref().chunks_exact(3) {
      assert!(close(pixel[0], 7) && close(pixel[1], 8) && close(pixel[2], 9));
    }
  }

  #[test]
  fn unsupported_format_is_reported() {
    let frame = RawFrame::new(4, 4, PixelFormat::Nv12, 4, vec![0u8; 24]);
    let mut converter = PixelBufferConverter::new(4, 4, TensorEncoding::Quantized);
    assert!(matches!(
      converter.convert(&frame),
      Err(ConvertError::UnsupportedFormat(PixelFormat::Nv12))
    ));
  }

  #[test]
  fn short_buffer_is_a_resize_failure() {
    let frame = RawFrame::new(4, 4, PixelFormat::Rgba, 16, vec![0u8; 20]);
    let mut converter = PixelBufferConverter::new(4, 4, TensorEncoding::Quantized);
    assert!(matches!(
      converter.convert(&frame),
      Err(ConvertError::ResizeFailure(_))
    ));
  }

  #[test]
  fn zero_sized_frame_is_a_resize_failure() {
    let frame = RawFrame::packed(0, 0, PixelFormat::Rgba, Vec::new());
    let mut converter = PixelBufferConverter::new(4, 4, TensorEncoding::Quantized);
    assert!(matches!(
      converter.convert(&frame),
      Err(ConvertError::ResizeFailure(_))
    ));
  }
}
