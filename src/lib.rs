//! Dockapp 资源指示器库
//!
//! 这个库提供了电池与处理器占用的小型指示器：后台周期采样、单飞刷新协调、
//! 计数器增量计算以及显示格式轮换。

pub mod app;
pub mod battery;
pub mod coordinator;
pub mod delta;
pub mod format;
pub mod geometry;
pub mod panel;
pub mod render;
pub mod rotator;
pub mod source;
pub mod stats;

// 重新导出主要的公共类型
pub use app::{BatteryConfig, CpuConfig, battery_main, cpu_main};
pub use battery::{BatteryMetrics, BatteryState, SysfsBattery};
pub use coordinator::{CoordinatorError, Latest, RefreshCoordinator};
pub use delta::{CpuDelta, DeltaTracker, delta, utilization};
pub use format::{MetricFormatter, SharedFormatter, TemplateFormatter, parse_formatters};
pub use geometry::{Point, Rect};
pub use rotator::{FormatRotator, FormatSubscriber};
pub use source::{SampleSource, StateSubscription};
pub use stats::{CpuSnapshot, CpuTime, ProcStat};
