//! 电池与处理器指示器的装配与绘制循环

use crate::battery::{BatteryMetrics, SysfsBattery};
use crate::coordinator::RefreshCoordinator;
use crate::delta::{CpuDelta, DeltaTracker};
use crate::format::{SharedFormatter, parse_formatters};
use crate::geometry::Rect;
use crate::panel::{BatteryLayout, BatteryPanel, CpuPanel};
use crate::render::{Palette, Surface, TerminalSurface};
use crate::rotator::{FormatRotator, FormatSubscriber};
use crate::stats::{CpuSnapshot, ProcStat};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// 电池指示器配置
#[derive(Debug, Clone)]
pub struct BatteryConfig {
    pub window: Rect,
    pub battery: Rect,
    pub text: Rect,
    pub border: i32,
    /// 电池数据的刷新间隔
    pub poll_interval: Duration,
    /// 文本格式的轮换间隔
    pub text_interval: Duration,
    /// 外接电源状态的检查间隔
    pub watch_interval: Duration,
    pub power_supply_dir: PathBuf,
    /// 轮换显示的模板，为空时使用默认格式
    pub templates: Vec<String>,
    pub columns: usize,
    pub rows: usize,
    pub palette: Palette,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        let layout = BatteryLayout::default();
        Self {
            window: layout.window,
            battery: layout.battery,
            text: layout.text,
            border: layout.border,
            poll_interval: Duration::from_secs(60),
            text_interval: Duration::from_millis(7500),
            watch_interval: Duration::from_secs(2),
            power_supply_dir: PathBuf::from(SysfsBattery::POWER_SUPPLY),
            templates: Vec::new(),
            columns: 40,
            rows: 3,
            palette: Palette::default(),
        }
    }
}

impl BatteryConfig {
    pub fn layout(&self) -> BatteryLayout {
        BatteryLayout {
            window: self.window,
            battery: self.battery,
            text: self.text,
            border: self.border,
        }
    }
}

/// 处理器指示器配置
#[derive(Debug, Clone)]
pub struct CpuConfig {
    pub window: Rect,
    pub poll_interval: Duration,
    /// 不显示的处理器名称，例如汇总行 `cpu`
    pub ignore: Vec<String>,
    pub stat_path: PathBuf,
    pub columns: usize,
    pub rows: usize,
    pub palette: Palette,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            window: Rect::new(0, 0, 100, 20),
            poll_interval: Duration::from_secs(1),
            ignore: vec!["cpu".to_string()],
            stat_path: PathBuf::from("/proc/stat"),
            columns: 40,
            rows: 4,
            palette: Palette::default(),
        }
    }
}

/// 电池绘制循环
///
/// 电池数据或显示格式任一变化时重绘。任一输入关闭后返回。
pub async fn run_battery<S: Surface + ?Sized>(
    panel: &BatteryPanel,
    surface: &mut S,
    mut metrics: watch::Receiver<Option<BatteryMetrics>>,
    mut formats: FormatSubscriber<SharedFormatter>,
) {
    let mut current = metrics.borrow_and_update().clone();
    let mut format: Option<SharedFormatter> = None;

    loop {
        tokio::select! {
            changed = metrics.changed() => {
                if changed.is_err() {
                    info!("电池数据源已停止");
                    break;
                }
                current = metrics.borrow_and_update().clone();
            }
            next = formats.next() => match next {
                Some(next) => format = Some(next),
                None => {
                    info!("格式轮换已停止");
                    break;
                }
            },
        }

        let Some(m) = current.as_ref() else {
            warn!("暂无电池数据");
            continue;
        };
        let Some(f) = format.as_ref() else {
            continue;
        };

        if let Err(e) = panel.draw(surface, m, f.as_ref()) {
            error!("绘制电池面板失败: {e}");
            continue;
        }
        if let Err(e) = surface.flush() {
            error!("输出画面失败: {e}");
        }
    }
}

/// 处理器绘制循环
///
/// 相邻两次原始采样求增量后绘制，忽略 `ignore` 中的处理器。数据源关闭后返回。
pub async fn run_cpu<S: Surface + ?Sized>(
    panel: &CpuPanel,
    surface: &mut S,
    mut snapshots: watch::Receiver<Option<CpuSnapshot>>,
    ignore: &[String],
) {
    let mut tracker = DeltaTracker::new();
    let mut names: Vec<String> = Vec::new();

    if let Some(first) = snapshots.borrow_and_update().clone() {
        tracker.observe(first);
    }

    while snapshots.changed().await.is_ok() {
        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };
        let Some(deltas) = tracker.observe(snapshot) else {
            debug!("已建立处理器基线");
            continue;
        };

        let deltas: Vec<CpuDelta> = deltas
            .into_iter()
            .filter(|cpu| !ignore.contains(&cpu.name))
            .collect();

        let current: Vec<String> = deltas.iter().map(|cpu| cpu.name.clone()).collect();
        if current != names {
            info!("处理器列表: {current:?}");
            names = current;
        }

        if let Err(e) = panel.draw(surface, &deltas) {
            error!("绘制处理器面板失败: {e}");
            continue;
        }
        if let Err(e) = surface.flush() {
            error!("输出画面失败: {e}");
        }
    }
    info!("处理器数据源已停止");
}

/// 等待退出信号
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听退出信号: {e}");
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在关闭...");
}

/// 运行电池指示器，直到收到退出信号
pub async fn battery_main(config: BatteryConfig) -> Result<()> {
    let formatters = parse_formatters(&config.templates).context("显示模板无效")?;
    let panel = BatteryPanel::new(config.layout(), config.palette.clone())
        .context("电池面板布局无效")?;
    let source = SysfsBattery::discover(&config.power_supply_dir)
        .context("无法找到电池")?
        .with_watch_interval(config.watch_interval);

    info!(
        "配置信息 - 窗口: {}, 电池: {}, 文本: {}, 刷新间隔: {:?}, 轮换间隔: {:?}",
        config.window, config.battery, config.text, config.poll_interval, config.text_interval
    );

    let mut coordinator = RefreshCoordinator::start(source, config.poll_interval)
        .await
        .context("刷新间隔无效")?;
    let (mut rotator, formats) = FormatRotator::spawn(config.text_interval, formatters)?;
    let mut surface = TerminalSurface::new(
        std::io::stdout(),
        config.window,
        config.columns,
        config.rows,
    );

    tokio::select! {
        _ = run_battery(&panel, &mut surface, coordinator.subscribe(), formats) => {
            warn!("电池绘制循环意外退出");
        }
        _ = shutdown_signal() => {}
    }

    rotator.stop().await;
    coordinator.stop().await;
    info!("电池指示器正常关闭");
    Ok(())
}

/// 运行处理器指示器，直到收到退出信号
pub async fn cpu_main(config: CpuConfig) -> Result<()> {
    let panel = CpuPanel::new(config.window, config.palette.clone())
        .context("处理器面板布局无效")?;
    let source = ProcStat::new(&config.stat_path);
    let first = source
        .read()
        .with_context(|| format!("无法读取 {}", config.stat_path.display()))?;
    info!("检测到处理器: {:?}", first.names());

    info!(
        "配置信息 - 窗口: {}, 刷新间隔: {:?}, 忽略: {:?}",
        config.window, config.poll_interval, config.ignore
    );

    let mut coordinator = RefreshCoordinator::start(source, config.poll_interval)
        .await
        .context("刷新间隔无效")?;
    let mut surface = TerminalSurface::new(
        std::io::stdout(),
        config.window,
        config.columns,
        config.rows,
    );

    tokio::select! {
        _ = run_cpu(&panel, &mut surface, coordinator.subscribe(), &config.ignore) => {
            warn!("处理器绘制循环意外退出");
        }
        _ = shutdown_signal() => {}
    }

    coordinator.stop().await;
    info!("处理器指示器正常关闭");
    Ok(())
}
