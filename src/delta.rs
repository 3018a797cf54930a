//! 计数器增量计算
//!
//! 只适用于单调递增的计数器（处理器时间），不适用于电量这类绝对值。

use crate::stats::{CpuSnapshot, CpuTime};
use log::{debug, warn};

/// 两次采样之间单个处理器的计数增量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuDelta {
    pub name: String,
    pub in_mode: Vec<i64>,
}

/// 相邻两次采样的形状不一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub previous: Vec<String>,
    pub current: Vec<String>,
}

impl std::fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "采样形状不一致: {:?} -> {:?}",
            self.previous, self.current
        )
    }
}

impl std::error::Error for ShapeMismatch {}

fn same_shape(prev: &[CpuTime], curr: &[CpuTime]) -> bool {
    prev.len() == curr.len()
        && prev
            .iter()
            .zip(curr)
            .all(|(a, b)| a.name == b.name && a.in_mode.len() == b.in_mode.len())
}

fn names(times: &[CpuTime]) -> Vec<String> {
    times.iter().map(|t| t.name.clone()).collect()
}

/// 逐字段计算 `curr - prev`
///
/// 两次采样必须以相同顺序描述相同的处理器；否则返回 [`ShapeMismatch`]。
/// 负增量意味着计数器被重置或数据损坏，会记录警告但保留原值。
pub fn delta(prev: &[CpuTime], curr: &[CpuTime]) -> Result<Vec<CpuDelta>, ShapeMismatch> {
    if !same_shape(prev, curr) {
        return Err(ShapeMismatch {
            previous: names(prev),
            current: names(curr),
        });
    }

    let deltas = prev
        .iter()
        .zip(curr)
        .map(|(a, b)| {
            let in_mode = a
                .in_mode
                .iter()
                .zip(&b.in_mode)
                .map(|(&old, &new)| new as i64 - old as i64)
                .collect::<Vec<_>>();

            if let Some(mode) = in_mode.iter().position(|&d| d < 0) {
                warn!(
                    "{} 的计数器在模式 {} 上出现负增量 ({})，可能已被重置",
                    b.name, mode, in_mode[mode]
                );
            }

            CpuDelta {
                name: b.name.clone(),
                in_mode,
            }
        })
        .collect();

    Ok(deltas)
}

/// 处理器占用率：`1 - 空闲增量 / 总增量`
///
/// 总增量为 0 时返回 0。
pub fn utilization(delta: &CpuDelta, idle_mode: usize) -> f64 {
    let total: i64 = delta.in_mode.iter().sum();
    if total <= 0 {
        debug!("{} 在本采样周期内没有计数变化", delta.name);
        return 0.0;
    }
    let idle = delta.in_mode.get(idle_mode).copied().unwrap_or(0);
    1.0 - idle as f64 / total as f64
}

/// 保存上一次采样并产出增量
#[derive(Debug, Default)]
pub struct DeltaTracker {
    previous: Option<CpuSnapshot>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录新采样；首次调用或形状变化时只建立基线，返回 `None`
    pub fn observe(&mut self, current: CpuSnapshot) -> Option<Vec<CpuDelta>> {
        let Some(previous) = self.previous.replace(current) else {
            return None;
        };
        let current = self.previous.as_ref()?;

        match delta(&previous.cpus, &current.cpus) {
            Ok(deltas) => Some(deltas),
            Err(mismatch) => {
                warn!("{mismatch}，重新建立基线");
                None
            }
        }
    }

    /// 丢弃基线
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
