use serde::Serialize;
use std::time::{Duration, Instant};

/// 进度动画中的一个阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStage {
    pub percent: u8,
    pub label: &'static str,
}

const fn stage(percent: u8, label: &'static str) -> ProgressStage {
    ProgressStage { percent, label }
}

/// 连接 ERP 的阶段序列; 最后一项只在完成时显示
pub const CONNECT_STAGES: &[ProgressStage] = &[
    stage(10, "Initializing connection..."),
    stage(30, "Connecting to Odoo server..."),
    stage(60, "Authenticating..."),
    stage(80, "Fetching invoice data..."),
    stage(100, "Connection successful!"),
];

pub const REFRESH_STAGES: &[ProgressStage] = &[
    stage(30, "Refreshing invoice data..."),
    stage(80, "Processing data..."),
    stage(100, "Refresh complete!"),
];

/// 对外展示的进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub percent: u8,
    pub label: String,
}

impl ProgressView {
    pub fn idle() -> Self {
        Self {
            percent: 0,
            label: String::new(),
        }
    }
}

impl From<ProgressStage> for ProgressView {
    fn from(stage: ProgressStage) -> Self {
        Self {
            percent: stage.percent,
            label: stage.label.to_string(),
        }
    }
}

/// 按时间推进的加载进度.
///
/// 进度只是示意, 与后端实际进展无关: 每过 `stage_interval` 前进一个阶段,
/// 在请求完成前停在倒数第二个阶段; `complete` 后固定为最后一个阶段.
#[derive(Debug, Clone)]
pub struct LoadingProgress {
    plan: &'static [ProgressStage],
    started_at: Instant,
    stage_interval: Duration,
    completed: bool,
}

impl LoadingProgress {
    pub fn start(plan: &'static [ProgressStage], stage_interval: Duration, now: Instant) -> Self {
        Self {
            plan,
            started_at: now,
            stage_interval,
            completed: false,
        }
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn current(&self, now: Instant) -> ProgressView {
        let Some(last) = self.plan.last() else {
            return ProgressView::idle();
        };
        if self.completed {
            return (*last).into();
        }

        let ceiling = self.plan.len().saturating_sub(2);
        let interval = self.stage_interval.as_millis();
        let index = if interval == 0 {
            ceiling
        } else {
            let elapsed = now.saturating_duration_since(self.started_at).as_millis();
            usize::try_from(elapsed / interval)
                .unwrap_or(usize::MAX)
                .min(ceiling)
        };
        self.plan[index].into()
    }
}
