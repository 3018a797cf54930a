//! 电池与处理器面板
//!
//! 面板把最新的采样值绘制到 [`Surface`] 上。格式化失败时整帧跳过，不会输出半帧。

use crate::battery::BatteryMetrics;
use crate::delta::{CpuDelta, utilization};
use crate::format::MetricFormatter;
use crate::geometry::{Point, Rect};
use crate::render::{Palette, RenderError, Rgba, Surface};
use crate::stats::MODE_IDLE;

/// 电池面板布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryLayout {
    pub window: Rect,
    /// 电池图标区域
    pub battery: Rect,
    /// 文本区域
    pub text: Rect,
    /// 外壳线宽
    pub border: i32,
}

impl Default for BatteryLayout {
    fn default() -> Self {
        Self {
            window: Rect::new(0, 0, 117, 20),
            battery: Rect::new(1, 2, 22, 20),
            text: Rect::new(22, 0, 117, 20),
            border: 1,
        }
    }
}

/// 根据状态与电量选择能量条颜色
pub fn energy_color(metrics: &BatteryMetrics, palette: &Palette) -> Rgba {
    if metrics.state.is_charging() {
        palette.energy_charging
    } else if metrics.fraction <= palette.low_threshold {
        palette.energy_low
    } else {
        palette.energy
    }
}

/// 电池面板
#[derive(Debug, Clone)]
pub struct BatteryPanel {
    layout: BatteryLayout,
    palette: Palette,
    /// 正极端子
    cap: Rect,
    /// 电池主体外框
    body: Rect,
    /// 能量条可用区域
    energy: Rect,
}

impl BatteryPanel {
    pub fn new(layout: BatteryLayout, palette: Palette) -> Result<Self, RenderError> {
        if layout.window.is_empty() {
            return Err(RenderError::EmptyLayout("window"));
        }

        let batt = layout.battery;
        let t = layout.border.max(1);
        let cap_width = (batt.dx() / 10).max(t);
        let cap = Rect::new(
            batt.min.x,
            batt.min.y + batt.dy() / 4,
            batt.min.x + cap_width,
            batt.max.y - batt.dy() / 4,
        );
        let body = Rect {
            min: Point::new(cap.max.x, batt.min.y),
            max: batt.max,
        };
        let energy = body.shrink(t);
        if energy.is_empty() {
            return Err(RenderError::EmptyLayout("battery"));
        }

        Ok(Self {
            layout,
            palette,
            cap,
            body,
            energy,
        })
    }

    pub fn layout(&self) -> &BatteryLayout {
        &self.layout
    }

    /// 电量为 `fraction` 时的能量条，从右向左消耗
    pub fn energy_rect(&self, fraction: f64) -> Rect {
        let fraction = fraction.clamp(0.0, 1.0);
        let drain = ((1.0 - fraction) * self.energy.dx() as f64).round() as i32;
        Rect {
            min: Point::new(self.energy.min.x + drain, self.energy.min.y),
            max: self.energy.max,
        }
    }

    /// 外壳的四条边
    fn shell(&self) -> [Rect; 4] {
        let b = self.body;
        let t = self.layout.border.max(1);
        [
            Rect::new(b.min.x, b.min.y, b.max.x, b.min.y + t),
            Rect::new(b.min.x, b.max.y - t, b.max.x, b.max.y),
            Rect::new(b.min.x, b.min.y, b.min.x + t, b.max.y),
            Rect::new(b.max.x - t, b.min.y, b.max.x, b.max.y),
        ]
    }

    pub fn draw<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        metrics: &BatteryMetrics,
        formatter: &dyn MetricFormatter,
    ) -> Result<(), RenderError> {
        // 先格式化，失败时不绘制任何内容
        let text = formatter.format(metrics)?;

        surface.fill_rect(self.layout.window, self.palette.background);

        let energy = self.energy_rect(metrics.fraction);
        if !energy.is_empty() {
            surface.fill_rect(energy, energy_color(metrics, &self.palette));
        }
        for edge in self.shell() {
            surface.fill_rect(edge, self.palette.shell);
        }
        surface.fill_rect(self.cap, self.palette.shell);

        // 以最大宽度居中，避免文本随内容左右跳动
        let width = match formatter.max_formatted_width() {
            Some(widest) => surface.text_width(&widest),
            None => surface.text_width(&text),
        };
        let area = self.layout.text;
        let at = Point::new(
            area.min.x + (area.dx() - width).max(0) / 2,
            area.min.y + (area.dy() - surface.text_height()).max(0) / 2,
        );
        surface.draw_text(at, &text, self.palette.foreground);
        Ok(())
    }
}

/// 处理器面板，每个处理器一列
#[derive(Debug, Clone)]
pub struct CpuPanel {
    window: Rect,
    palette: Palette,
}

impl CpuPanel {
    pub fn new(window: Rect, palette: Palette) -> Result<Self, RenderError> {
        if window.is_empty() {
            return Err(RenderError::EmptyLayout("window"));
        }
        Ok(Self { window, palette })
    }

    /// 第 `i` 列（共 `n` 列）的区域
    fn column(&self, i: usize, n: usize) -> Rect {
        let w = self.window.dx() as i64;
        let x0 = self.window.min.x + (w * i as i64 / n as i64) as i32;
        let x1 = self.window.min.x + (w * (i as i64 + 1) / n as i64) as i32;
        Rect::new(x0, self.window.min.y, x1, self.window.max.y)
    }

    pub fn draw<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        deltas: &[CpuDelta],
    ) -> Result<(), RenderError> {
        if deltas.is_empty() {
            return Err(RenderError::NoData);
        }

        surface.fill_rect(self.window, self.palette.background);

        let n = deltas.len();
        for (i, cpu) in deltas.iter().enumerate() {
            let column = self.column(i, n);
            let util = utilization(cpu, MODE_IDLE).clamp(0.0, 1.0);
            let height = (util * column.dy() as f64).round() as i32;
            if height == 0 || column.is_empty() {
                continue;
            }
            surface.fill_rect(
                Rect::new(column.min.x, column.max.y - height, column.max.x, column.max.y),
                self.palette.foreground,
            );
        }
        Ok(())
    }
}
