// 该文件是 Shiyu （视域） 项目的一部分。
// src/session.rs - 采集会话生命周期
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

use thiserror::Error;
use tracing::{error, info, warn};

use crate::worker::FrameSink;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
  #[error("相机权限被拒绝")]
  PermissionDenied,
  #[error("会话配置失败: {0}")]
  ConfigurationFailed(String),
  #[error("会话启动失败: {0}")]
  StartFailed(String),
}

/// 采集会话被中断的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionReason {
  VideoDeviceNotAvailableInBackground,
  AudioDeviceInUseByAnotherClient,
  VideoDeviceInUseByAnotherClient,
  VideoDeviceNotAvailableWithMultipleForegroundApps,
  VideoDeviceNotAvailableDueToSystemPressure,
  Other(i64),
}

impl InterruptionReason {
  pub fn from_code(code: i64) -> Self {
    match code {
      1 => InterruptionReason::VideoDeviceNotAvailableInBackground,
      2 => InterruptionReason::AudioDeviceInUseByAnotherClient,
      3 => InterruptionReason::VideoDeviceInUseByAnotherClient,
      4 => InterruptionReason::VideoDeviceNotAvailableWithMultipleForegroundApps,
      5 => InterruptionReason::VideoDeviceNotAvailableDueToSystemPressure,
      other => InterruptionReason::Other(other),
    }
  }

  pub fn code(&self) -> i64 {
    match self {
      InterruptionReason::VideoDeviceNotAvailableInBackground => 1,
      InterruptionReason::AudioDeviceInUseByAnotherClient => 2,
      InterruptionReason::VideoDeviceInUseByAnotherClient => 3,
      InterruptionReason::VideoDeviceNotAvailableWithMultipleForegroundApps => 4,
      InterruptionReason::VideoDeviceNotAvailableDueToSystemPressure => 5,
      InterruptionReason::Other(code) => *code,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
  /// 媒体服务被重置，会话可以重新启动
  MediaServicesReset,
  Other(String),
}

/// 上游会话发出的状态事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
  Interrupted(InterruptionReason),
  InterruptionEnded,
  RuntimeError(RuntimeErrorKind),
}

/// 报告给展示端的会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
  Running,
  Stopped,
  PermissionDenied,
  ConfigurationFailed(String),
  Interrupted(InterruptionReason),
  InterruptionEnded,
  ResumeCompleted { running: bool },
  RuntimeError { message: String, restarted: bool },
}

/// 帧来源（相机等）的会话
///
/// 会话的所有方法都在工作线程上调用；帧通过 `FrameSink` 交付。
pub trait CaptureSession: Send {
  fn configure(&mut self) -> Result<(), SessionError>;
  fn start(&mut self, sink: FrameSink) -> Result<(), SessionError>;
  fn stop(&mut self);
  fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Configuration {
  Pending,
  Ready,
  Failed(SessionError),
}

/// 会话状态机，启动、停止与恢复都是幂等的
pub struct SessionController<S> {
  session: S,
  sink: FrameSink,
  configuration: Configuration,
  running: bool,
}

impl<S: CaptureSession> SessionController<S> {
  pub fn new(session: S, sink: FrameSink) -> Self {
    Self {
      session,
      sink,
      configuration: Configuration::Pending,
      running: false,
    }
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn session(&self) -> &S {
    &self.session
  }

  /// 配置（仅首次）并启动会话
  pub fn start(&mut self) -> SessionStatus {
    if self.running {
      return SessionStatus::Running;
    }

    if self.configuration == Configuration::Pending {
      self.configuration = match self.session.configure() {
        Ok(()) => Configuration::Ready,
        Err(e) => {
          error!("会话配置失败: {}", e);
          Configuration::Failed(e)
        }
      };
    }

    if let Configuration::Failed(e) = &self.configuration {
      return match e {
        SessionError::PermissionDenied => SessionStatus::PermissionDenied,
        e => SessionStatus::ConfigurationFailed(e.to_string()),
      };
    }
    self.start_session()
  }

  pub fn stop(&mut self) -> Option<SessionStatus> {
    if !self.running {
      return None;
    }
    self.session.stop();
    self.running = self.session.is_running();
    info!("会话已停止");
    Some(SessionStatus::Stopped)
  }

  /// 恢复被中断的会话，返回会话是否在运行
  pub fn resume(&mut self) -> bool {
    if !self.running && self.configuration == Configuration::Ready {
      self.start_session();
    }
    self.running
  }

  pub fn handle_event(&mut self, event: SessionEvent) -> SessionStatus {
    match event {
      SessionEvent::Interrupted(reason) => {
        warn!("会话被中断, 原因 {}", reason.code());
        SessionStatus::Interrupted(reason)
      }
      SessionEvent::InterruptionEnded => {
        info!("会话中断结束");
        SessionStatus::InterruptionEnded
      }
      SessionEvent::RuntimeError(RuntimeErrorKind::MediaServicesReset) => {
        warn!("会话运行时错误: 媒体服务被重置");
        let restarted = if self.running {
          self.session.stop();
          self.running = false;
          self.start_session() == SessionStatus::Running
        } else {
          false
        };
        SessionStatus::RuntimeError {
          message: "media services were reset".to_string(),
          restarted,
        }
      }
      SessionEvent::RuntimeError(RuntimeErrorKind::Other(message)) => {
        error!("会话运行时错误: {}", message);
        SessionStatus::RuntimeError {
          message,
          restarted: false,
        }
      }
    }
  }

  fn start_session(&mut self) -> SessionStatus {
    match self.session.start(self.sink.clone()) {
      Ok(()) => {
        self.running = self.session.is_running();
        info!("会话已启动");
        SessionStatus::Running
      }
      Err(e) => {
        error!("会话启动失败: {}", e);
        self.running = false;
        SessionStatus::ConfigurationFailed(e.to_string())
      }
    }
  }
}
