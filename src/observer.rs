// 该文件是 Shiyu （视域） 项目的一部分。
// src/observer.rs - 展示端接口
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

use std::sync::{
  Arc,
  mpsc::{self, Receiver, Sender},
};

use tracing::debug;

use crate::{detect::InferenceResult, pipeline::ErrorKind, session::SessionStatus};

/// 由展示端实现、在构造时注入的回调接口
///
/// 工作线程在固定时点同步调用：帧被接纳或被调度器丢弃、结果就绪、单帧出错、致命错误、会话状态变化。
pub trait PipelineObserver: Send {
  fn frame_admitted(&self, _timestamp_ms: i64) {}
  /// `elapsed_ms` 为距上次接纳的时间
  fn frame_dropped(&self, _elapsed_ms: i64) {}
  fn result_ready(&self, result: Arc<InferenceResult>);
  fn frame_failed(&self, kind: ErrorKind, message: &str);
  fn fatal(&self, kind: ErrorKind, message: &str);
  fn session_status(&self, status: &SessionStatus);
}

#[derive(Debug, Clone)]
pub enum Notification {
  FrameAdmitted(i64),
  FrameDropped(i64),
  Result(Arc<InferenceResult>),
  FrameFailed { kind: ErrorKind, message: String },
  Fatal { kind: ErrorKind, message: String },
  Session(SessionStatus),
}

/// 把回调逐条转交给展示线程
pub struct ChannelObserver {
  tx: Sender<Notification>,
}

impl ChannelObserver {
  pub fn new() -> (Self, Receiver<Notification>) {
    let (tx, rx) = mpsc::channel();
    (Self { tx }, rx)
  }

  fn send(&self, notification: Notification) {
    if self.tx.send(notification).is_err() {
      debug!("展示端已关闭, 丢弃通知");
    }
  }
}

impl PipelineObserver for ChannelObserver {
  fn frame_admitted(&self, timestamp_ms: i64) {
    self.send(Notification::FrameAdmitted(timestamp_ms));
  }

  fn frame_dropped(&self, elapsed_ms: i64) {
    self.send(Notification::FrameDropped(elapsed_ms));
  }

  fn result_ready(&self, result: Arc<InferenceResult>) {
    self.send(Notification::Result(result));
  }

  fn frame_failed(&self, kind: ErrorKind, message: &str) {
    self.send(Notification::FrameFailed {
      kind,
      message: message.to_string(),
    });
  }

  fn fatal(&self, kind: ErrorKind, message: &str) {
    self.send(Notification::Fatal {
      kind,
      message: message.to_string(),
    });
  }

  fn session_status(&self, status: &SessionStatus) {
    self.send(Notification::Session(status.clone()));
  }
}
