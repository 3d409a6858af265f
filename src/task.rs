// 该文件是 Shiyu （视域） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  sync::mpsc::{self, RecvTimeoutError},
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
  input::InputWrapper,
  model::Interpreter,
  observer::{ChannelObserver, Notification},
  output::Render,
  pipeline::DetectionPipeline,
  scheduler::SystemClock,
  session::SessionStatus,
  worker,
};

const NOTIFICATION_POLL: Duration = Duration::from_millis(100);

pub trait Task<I, R, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: DetectionPipeline<R>, output: O) -> Result<(), Self::Error>;
}

/// 同步处理一帧，不经过调度器与工作线程
pub struct OneShotTask;

impl<R, O> Task<InputWrapper, R, O> for OneShotTask
where
  R: Interpreter,
  O: Render,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: InputWrapper,
    mut pipeline: DetectionPipeline<R>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.capture_one()?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = pipeline.run(&frame)?;
    info!(
      "推理完成，耗时: {:.2?} (运行时 {:.2} ms), {} 个检测",
      now.elapsed(),
      result.inference_ms,
      result.detections.len()
    );
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 在工作线程上运行实时流水线，当前线程充当展示端
///
/// 展示端以源的预览帧作为底图绘制最新结果。
#[derive(Default, Debug)]
pub struct LiveTask {
  result_number: Option<usize>,
}

impl LiveTask {
  pub fn with_result_number(mut self, result_number: Option<usize>) -> Self {
    self.result_number = result_number;
    self
  }
}

impl<R, O> Task<InputWrapper, R, O> for LiveTask
where
  R: Interpreter + Send + 'static,
  O: Render,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: InputWrapper,
    pipeline: DetectionPipeline<R>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let preview = input.capture_one()?;
    let (observer, notifications) = ChannelObserver::new();
    let handle = worker::spawn(pipeline, input, observer, SystemClock)?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    handle.start()?;

    let mut results = 0usize;
    loop {
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      let notification = match notifications.recv_timeout(NOTIFICATION_POLL) {
        Ok(notification) => notification,
        Err(RecvTimeoutError::Timeout) => continue,
        Err(RecvTimeoutError::Disconnected) => {
          warn!("工作线程已退出");
          break;
        }
      };

      match notification {
        Notification::FrameAdmitted(timestamp) => debug!("接纳帧 @ {}", timestamp),
        Notification::FrameDropped(elapsed) => debug!("调度丢弃帧, 距上次 {} ms", elapsed),
        Notification::Result(result) => {
          results += 1;
          info!(
            "第 {} 个结果: {} 个检测, 推理 {:.2} ms",
            results,
            result.detections.len(),
            result.inference_ms
          );
          output.render_result(&preview, &result)?;
          if self.result_number.is_some_and(|n| results >= n) {
            info!("达到指定结果数 {}, 退出任务循环", results);
            break;
          }
        }
        Notification::FrameFailed { kind, message } => warn!("帧处理失败 ({}): {}", kind, message),
        Notification::Fatal { kind, message } => {
          error!("流水线停止 ({}): {}", kind, message);
          handle.shutdown()?;
          anyhow::bail!("流水线停止: {}", message);
        }
        Notification::Session(status) => match status {
          SessionStatus::PermissionDenied => {
            handle.shutdown()?;
            anyhow::bail!("没有访问输入源的权限");
          }
          SessionStatus::ConfigurationFailed(message) => {
            handle.shutdown()?;
            anyhow::bail!("输入源配置失败: {}", message);
          }
          SessionStatus::Interrupted(reason) => warn!("会话中断 ({:?})", reason),
          SessionStatus::InterruptionEnded => {
            info!("会话中断结束, 尝试恢复");
            handle.resume()?;
          }
          SessionStatus::RuntimeError {
            message,
            restarted: false,
          } => warn!("会话运行时错误且未恢复: {}", message),
          other => info!("会话状态: {:?}", other),
        },
      }
    }

    let dropped = handle.sink().dropped_frames();
    handle.shutdown()?;
    info!("任务完成，退出 (忙时丢弃 {} 帧)", dropped);
    Ok(())
  }
}
