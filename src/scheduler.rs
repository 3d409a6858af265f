// 该文件是 Shiyu （视域） 项目的一部分。
// src/scheduler.rs - 推理节流调度
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

use tracing::{debug, warn};

/// 毫秒级时间源
pub trait Clock: Send {
  /// 自 Unix 纪元起的毫秒数
  fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    chrono::Utc::now().timestamp_millis()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  /// 距上次推理不足最小间隔
  Idle,
  /// 下一帧将被接纳
  Armed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  Admitted,
  Dropped { elapsed_ms: i64 },
}

impl Admission {
  pub fn is_admitted(&self) -> bool {
    matches!(self, Admission::Admitted)
  }
}

/// 按最小推理间隔对实时帧流做丢帧
///
/// 被丢弃的帧不排队；最新结果总是来自最近一次被接纳的帧。
#[derive(Debug, Clone)]
pub struct InferenceScheduler {
  min_interval_ms: i64,
  last_admitted_ms: Option<i64>,
}

impl InferenceScheduler {
  pub fn new(min_interval_ms: i64) -> Self {
    Self {
      min_interval_ms,
      last_admitted_ms: None,
    }
  }

  pub fn min_interval_ms(&self) -> i64 {
    self.min_interval_ms
  }

  pub fn last_admitted_ms(&self) -> Option<i64> {
    self.last_admitted_ms
  }

  pub fn state(&self, now_ms: i64) -> SchedulerState {
    match self.last_admitted_ms {
      Some(last) if (0..self.min_interval_ms).contains(&(now_ms - last)) => SchedulerState::Idle,
      _ => SchedulerState::Armed,
    }
  }

  pub fn admit(&mut self, now_ms: i64) -> Admission {
    if let Some(last) = self.last_admitted_ms {
      let elapsed_ms = now_ms - last;
      if elapsed_ms < 0 {
        warn!("时钟回拨 {} ms, 重新接纳", -elapsed_ms);
      } else if elapsed_ms < self.min_interval_ms {
        debug!("距上次推理 {} ms, 丢弃该帧", elapsed_ms);
        return Admission::Dropped { elapsed_ms };
      }
    }
    self.last_admitted_ms = Some(now_ms);
    Admission::Admitted
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drops_inside_interval_then_admits() {
    let mut scheduler = InferenceScheduler::new(200);
    assert_eq!(scheduler.admit(0), Admission::Admitted);
    assert_eq!(scheduler.admit(150), Admission::Dropped { elapsed_ms: 150 });
    assert_eq!(scheduler.last_admitted_ms(), Some(0));
    assert_eq!(scheduler.admit(220), Admission::Admitted);
    assert_eq!(scheduler.last_admitted_ms(), Some(220));
  }

  #[test]
  fn first_frame_is_always_admitted() {
    let mut scheduler = InferenceScheduler::new(200);
    assert_eq!(scheduler.state(1_700_000_000_000), SchedulerState::Armed);
    assert!(scheduler.admit(1_700_000_000_000).is_admitted());
  }

  #[test]
  fn burst_admits_exactly_one() {
    let mut scheduler = InferenceScheduler::new(200);
    let admitted = (0..50)
      .map(|i| scheduler.admit(1_000 + i * 3))
      .filter(Admission::is_admitted)
      .count();
    assert_eq!(admitted, 1);
  }

  #[test]
  fn spaced_stream_admits_all() {
    let mut scheduler = InferenceScheduler::new(200);
    let admitted = (0..50)
      .map(|i| scheduler.admit(i * 200))
      .filter(Admission::is_admitted)
      .count();
    assert_eq!(admitted, 50);
  }

  #[test]
  fn state_tracks_interval() {
    let mut scheduler = InferenceScheduler::new(200);
    scheduler.admit(1_000);
    assert_eq!(scheduler.state(1_100), SchedulerState::Idle);
    assert_eq!(scheduler.state(1_200), SchedulerState::Armed);
  }

  #[test]
  fn clock_going_backwards_rearms() {
    let mut scheduler = InferenceScheduler::new(200);
    scheduler.admit(10_000);
    assert!(scheduler.admit(5_000).is_admitted());
  }
}
