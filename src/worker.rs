// 该文件是 Shiyu （视域） 项目的一部分。
// src/worker.rs - 推理工作线程
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

//! 单一工作线程上的帧处理。
//!
//! 帧与控制命令共用一个零容量通道：帧以 `try_send` 交付，工作线程正忙时帧被直接丢弃；
//! 控制命令以阻塞方式发送，保证送达。工作线程是唯一触碰预处理缓冲与推理运行时的线程，
//! 展示端只通过观察者回调和 [`LatestResult`] 拿到不可变的结果快照。

use std::{
  io,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
    mpsc::{self, Receiver, SyncSender, TrySendError},
  },
  thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  detect::InferenceResult,
  frame::RawFrame,
  model::Interpreter,
  observer::PipelineObserver,
  pipeline::DetectionPipeline,
  scheduler::{Admission, Clock},
  session::{CaptureSession, SessionController, SessionEvent, SessionStatus},
};

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("工作线程已退出")]
  Disconnected,
  #[error("工作线程启动失败: {0}")]
  Spawn(#[from] io::Error),
  #[error("工作线程异常退出")]
  Panicked,
}

pub enum Command {
  Frame(RawFrame),
  Start,
  Stop,
  Resume,
  Session(SessionEvent),
  Shutdown,
}

/// 会话向工作线程交付帧的入口
#[derive(Clone)]
pub struct FrameSink {
  tx: SyncSender<Command>,
  dropped: Arc<AtomicU64>,
}

impl FrameSink {
  /// 新建帧入口与对应的命令接收端，`capacity` 为 0 时即为交接式通道
  pub(crate) fn channel(capacity: usize) -> (Self, Receiver<Command>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    let sink = FrameSink {
      tx,
      dropped: Arc::new(AtomicU64::new(0)),
    };
    (sink, rx)
  }

  /// 工作线程空闲时交付帧并返回 `true`，否则丢弃该帧
  pub fn deliver(&self, frame: RawFrame) -> bool {
    match self.tx.try_send(Command::Frame(frame)) {
      Ok(()) => true,
      Err(TrySendError::Full(_)) => {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
      }
      Err(TrySendError::Disconnected(_)) => false,
    }
  }

  /// 因工作线程正忙而被丢弃的帧数
  pub fn dropped_frames(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }
}

/// 最近一次完成的推理结果
#[derive(Clone, Default)]
pub struct LatestResult {
  inner: Arc<Mutex<Option<Arc<InferenceResult>>>>,
}

impl LatestResult {
  pub fn get(&self) -> Option<Arc<InferenceResult>> {
    self
      .inner
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn publish(&self, result: Arc<InferenceResult>) {
    *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
  }
}

struct PipelineWorker<R, S, O, C> {
  pipeline: DetectionPipeline<R>,
  session: SessionController<S>,
  observer: O,
  clock: C,
  latest: LatestResult,
  halted: bool,
}

impl<R, S, O, C> PipelineWorker<R, S, O, C>
where
  R: Interpreter,
  S: CaptureSession,
  O: PipelineObserver,
  C: Clock,
{
  fn run(mut self, rx: Receiver<Command>) {
    info!("工作线程启动");
    while let Ok(command) = rx.recv() {
      match command {
        Command::Frame(frame) => self.on_frame(frame),
        Command::Start => {
          let status = self.session.start();
          self.observer.session_status(&status);
        }
        Command::Stop => {
          if let Some(status) = self.session.stop() {
            self.observer.session_status(&status);
          }
        }
        Command::Resume => {
          let running = self.session.resume();
          self
            .observer
            .session_status(&SessionStatus::ResumeCompleted { running });
        }
        Command::Session(event) => {
          let status = self.session.handle_event(event);
          self.observer.session_status(&status);
        }
        Command::Shutdown => {
          if let Some(status) = self.session.stop() {
            self.observer.session_status(&status);
          }
          break;
        }
      }
    }
    info!("工作线程退出");
  }

  fn on_frame(&mut self, frame: RawFrame) {
    if self.halted {
      return;
    }
    if !self.session.is_running() {
      debug!("会话未运行, 丢弃迟到的帧");
      return;
    }

    let now_ms = self.clock.now_ms();
    if let Admission::Dropped { elapsed_ms } = self.pipeline.admit(now_ms) {
      debug!("距上次推理 {} ms, 丢弃该帧", elapsed_ms);
      self.observer.frame_dropped(elapsed_ms);
      return;
    }
    self.observer.frame_admitted(now_ms);

    match self.pipeline.run(&frame) {
      Ok(result) => {
        let result = Arc::new(result);
        self.latest.publish(result.clone());
        self.observer.result_ready(result);
      }
      Err(e) if e.is_recoverable() => {
        warn!("处理帧失败: {}", e);
        self.observer.frame_failed(e.kind(), &e.to_string());
      }
      Err(e) => {
        error!("流水线停止: {}", e);
        self.halted = true;
        self.observer.fatal(e.kind(), &e.to_string());
      }
    }
  }
}

/// 展示端持有的工作线程句柄
pub struct PipelineHandle {
  tx: SyncSender<Command>,
  sink: FrameSink,
  latest: LatestResult,
  thread: Option<JoinHandle<()>>,
}

/// 在独立线程上启动流水线
pub fn spawn<R, S, O, C>(
  pipeline: DetectionPipeline<R>,
  session: S,
  observer: O,
  clock: C,
) -> Result<PipelineHandle, WorkerError>
where
  R: Interpreter + Send + 'static,
  S: CaptureSession + 'static,
  O: PipelineObserver + 'static,
  C: Clock + 'static,
{
  let (sink, rx) = FrameSink::channel(0);
  let tx = sink.tx.clone();
  let latest = LatestResult::default();
  let worker = PipelineWorker {
    pipeline,
    session: SessionController::new(session, sink.clone()),
    observer,
    clock,
    latest: latest.clone(),
    halted: false,
  };
  let thread = thread::Builder::new()
    .name("shiyu-worker".to_string())
    .spawn(move || worker.run(rx))?;

  Ok(PipelineHandle {
    tx,
    sink,
    latest,
    thread: Some(thread),
  })
}

impl PipelineHandle {
  pub fn start(&self) -> Result<(), WorkerError> {
    self.send(Command::Start)
  }

  pub fn stop(&self) -> Result<(), WorkerError> {
    self.send(Command::Stop)
  }

  /// 恢复被中断的会话，结果以 `SessionStatus::ResumeCompleted` 通知
  pub fn resume(&self) -> Result<(), WorkerError> {
    self.send(Command::Resume)
  }

  pub fn post_event(&self, event: SessionEvent) -> Result<(), WorkerError> {
    self.send(Command::Session(event))
  }

  pub fn sink(&self) -> FrameSink {
    self.sink.clone()
  }

  pub fn latest(&self) -> Option<Arc<InferenceResult>> {
    self.latest.get()
  }

  pub fn shutdown(mut self) -> Result<(), WorkerError> {
    self.shutdown_inner()
  }

  fn send(&self, command: Command) -> Result<(), WorkerError> {
    self.tx.send(command).map_err(|_| WorkerError::Disconnected)
  }

  fn shutdown_inner(&mut self) -> Result<(), WorkerError> {
    let Some(thread) = self.thread.take() else {
      return Ok(());
    };
    // 线程已退出时发送失败，直接回收即可
    let _ = self.tx.send(Command::Shutdown);
    thread.join().map_err(|_| WorkerError::Panicked)
  }
}

impl Drop for PipelineHandle {
  fn drop(&mut self) {
    if let Err(e) = self.shutdown_inner() {
      error!("关闭工作线程失败: {}", e);
    }
  }
}

