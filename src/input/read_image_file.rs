// 该文件是 Shiyu （视域） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  io,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
  time::Duration,
};

use image::{ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PACKED_CHANNELS, PixelFormat, RGB_CHANNELS, RawFrame},
  session::{CaptureSession, SessionError},
  worker::FrameSink,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(image::ImageError),
  #[error("Invalid query parameter: {0}")]
  InvalidQuery(String),
  #[error("Pixel format {0:?} cannot be produced from an image file")]
  UnsupportedFormat(PixelFormat),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

impl From<ImageFileInputError> for SessionError {
  fn from(err: ImageFileInputError) -> Self {
    match err {
      ImageFileInputError::IoError(e) if e.kind() == io::ErrorKind::PermissionDenied => {
        SessionError::PermissionDenied
      }
      ImageFileInputError::ImageLoadError(image::ImageError::IoError(e))
        if e.kind() == io::ErrorKind::PermissionDenied =>
      {
        SessionError::PermissionDenied
      }
      other => SessionError::ConfigurationFailed(other.to_string()),
    }
  }
}

const DEFAULT_FPS: u32 = 30;

struct Producer {
  running: Arc<AtomicBool>,
  thread: JoinHandle<()>,
}

/// 以固定帧率重复交付同一张图像的采集会话
///
/// `image:///path/to/file.png?fps=30&format=bgra&frames=100`
pub struct ImageFileSession {
  path: String,
  format: PixelFormat,
  fps: u32,
  frames: Option<usize>,
  frame: Option<RawFrame>,
  producer: Option<Producer>,
}

impl FromUrlWithScheme for ImageFileSession {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileSession {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut session = ImageFileSession {
      path: url.path().to_string(),
      format: PixelFormat::Bgra,
      fps: DEFAULT_FPS,
      frames: None,
      frame: None,
      producer: None,
    };
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "fps" => {
          session.fps = value
            .parse::<u32>()
            .ok()
            .filter(|fps| *fps > 0)
            .ok_or_else(|| ImageFileInputError::InvalidQuery(format!("fps={value}")))?;
        }
        "format" => {
          session.format = PixelFormat::from_name(&value)
            .ok_or_else(|| ImageFileInputError::InvalidQuery(format!("format={value}")))?;
        }
        "frames" => {
          let frames = value
            .parse::<usize>()
            .map_err(|_| ImageFileInputError::InvalidQuery(format!("frames={value}")))?;
          session.frames = Some(frames);
        }
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }
    Ok(session)
  }
}

impl ImageFileSession {
  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  /// 读取（或复用已读取的）图像帧
  pub fn read_frame(&mut self) -> Result<RawFrame, ImageFileInputError> {
    if let Some(frame) = &self.frame {
      return Ok(frame.clone());
    }
    info!("读取图像文件: {}", self.path);
    let image = ImageReader::open(&self.path)?.decode()?.to_rgba8();
    let frame = frame_from_image(&image, self.format)?;
    self.frame = Some(frame.clone());
    Ok(frame)
  }
}

impl CaptureSession for ImageFileSession {
  fn configure(&mut self) -> Result<(), SessionError> {
    self.read_frame()?;
    Ok(())
  }

  fn start(&mut self, sink: FrameSink) -> Result<(), SessionError> {
    if self.is_running() {
      return Ok(());
    }
    // 回收已放完帧的线程
    self.stop();
    let frame = self.read_frame()?;
    let interval = Duration::from_secs_f64(1.0 / self.fps as f64);
    let limit = self.frames;
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let thread = thread::Builder::new()
      .name("shiyu-image-source".to_string())
      .spawn(move || {
        let mut offered = 0usize;
        let mut delivered = 0usize;
        while flag.load(Ordering::Acquire) && limit.is_none_or(|n| offered < n) {
          offered += 1;
          if sink.deliver(frame.clone()) {
            delivered += 1;
          }
          thread::sleep(interval);
        }
        flag.store(false, Ordering::Release);
        debug!("图像源结束: 提供 {} 帧, 交付 {} 帧", offered, delivered);
      })
      .map_err(|e| SessionError::StartFailed(e.to_string()))?;

    self.producer = Some(Producer { running, thread });
    Ok(())
  }

  fn stop(&mut self) {
    if let Some(producer) = self.producer.take() {
      producer.running.store(false, Ordering::Release);
      if producer.thread.join().is_err() {
        error!("图像源线程异常退出");
      }
    }
  }

  fn is_running(&self) -> bool {
    self
      .producer
      .as_ref()
      .is_some_and(|producer| producer.running.load(Ordering::Acquire))
  }
}

impl Drop for ImageFileSession {
  fn drop(&mut self) {
    self.stop();
  }
}

/// 把解码后的 RGBA 图像排列成指定像素格式的原始帧
pub fn frame_from_image(image: &RgbaImage, format: PixelFormat) -> Result<RawFrame, ImageFileInputError> {
  let (width, height) = image.dimensions();

  if let Some(offsets) = format.rgb_offsets() {
    let alpha = (0..PACKED_CHANNELS)
      .find(|i| !offsets.contains(i))
      .unwrap_or(PACKED_CHANNELS - 1);
    let mut data = vec![0u8; width as usize * height as usize * PACKED_CHANNELS];
    for (dst, pixel) in data.chunks_exact_mut(PACKED_CHANNELS).zip(image.pixels()) {
      for (c, offset) in offsets.iter().enumerate() {
        dst[*offset] = pixel[c];
      }
      dst[alpha] = pixel[3];
    }
    return Ok(RawFrame::packed(width, height, format, data));
  }

  if format == PixelFormat::Rgb24 {
    let data: Vec<u8> = image
      .pixels()
      .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
      .collect();
    let stride = width as usize * RGB_CHANNELS;
    return Ok(RawFrame::new(width, height, format, stride, data));
  }

  Err(ImageFileInputError::UnsupportedFormat(format))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgba;

  fn image() -> RgbaImage {
    RgbaImage::from_fn(2, 1, |x, _| {
      if x == 0 {
        Rgba([10, 20, 30, 255])
      } else {
        Rgba([40, 50, 60, 128])
      }
    })
  }

  #[test]
  fn bgra_layout() {
    let frame = frame_from_image(&image(), PixelFormat::Bgra).unwrap();
    assert_eq!(frame.data(), &[30, 20, 10, 255, 60, 50, 40, 128]);
    assert_eq!(frame.stride(), 8);
  }

  #[test]
  fn argb_layout() {
    let frame = frame_from_image(&image(), PixelFormat::Argb).unwrap();
    assert_eq!(frame.data(), &[255, 10, 20, 30, 128, 40, 50, 60]);
  }

  #[test]
  fn rgb24_layout() {
    let frame = frame_from_image(&image(), PixelFormat::Rgb24).unwrap();
    assert_eq!(frame.data(), &[10, 20, 30, 40, 50, 60]);
    assert_eq!(frame.stride(), 6);
  }

  #[test]
  fn yuv_is_rejected() {
    assert!(matches!(
      frame_from_image(&image(), PixelFormat::Nv12),
      Err(ImageFileInputError::UnsupportedFormat(PixelFormat::Nv12))
    ));
  }

  #[test]
  fn parses_query() {
    let url = Url::parse("image:///tmp/a.png?fps=5&format=rgba&frames=3").unwrap();
    let session = ImageFileSession::from_url(&url).unwrap();
    assert_eq!(session.path(), "/tmp/a.png");
    assert_eq!(session.format(), PixelFormat::Rgba);
    assert_eq!(session.fps, 5);
    assert_eq!(session.frames, Some(3));
  }

  #[test]
  fn rejects_zero_fps() {
    let url = Url::parse("image:///tmp/a.png?fps=0").unwrap();
    assert!(matches!(
      ImageFileSession::from_url(&url),
      Err(ImageFileInputError::InvalidQuery(_))
    ));
  }

  #[test]
  fn session_stops_running_after_frame_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    image().save(&path).unwrap();
    let url = Url::parse(&format!("image://{}?fps=1000&frames=2", path.display())).unwrap();
    let mut session = ImageFileSession::from_url(&url).unwrap();
    let (sink, rx) = FrameSink::channel(4);

    session.configure().unwrap();
    session.start(sink.clone()).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while session.is_running() {
      assert!(std::time::Instant::now() < deadline, "producer never finished");
      thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(rx.try_iter().count(), 2);

    // 放完后可以重新启动
    session.start(sink).unwrap();
    session.stop();
    assert!(!session.is_running());
  }

  #[test]
  fn missing_file_fails_configuration() {
    let url = Url::parse("image:///nonexistent/shiyu.png").unwrap();
    let mut session = ImageFileSession::from_url(&url).unwrap();
    assert!(matches!(
      session.configure(),
      Err(SessionError::ConfigurationFailed(_))
    ));
  }
}
