//! 电池状态采集
//!
//! 数据来自 `/sys/class/power_supply`，外接电源的 `online` 变化会作为推送通知。

use crate::source::{SampleSource, StateSubscription};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// 电池状态，取值与 UPower 的整数定义一致
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryState {
    #[default]
    Unknown = 0,
    Charging = 1,
    Discharging = 2,
    Empty = 3,
    FullyCharged = 4,
    PendingCharge = 5,
    PendingDischarge = 6,
}

impl BatteryState {
    /// 将 sysfs `status` 文件内容映射为状态
    pub fn from_sysfs_status(status: &str) -> Self {
        match status.trim() {
            "Charging" => BatteryState::Charging,
            "Discharging" => BatteryState::Discharging,
            "Full" => BatteryState::FullyCharged,
            "Not charging" => BatteryState::PendingCharge,
            "Empty" => BatteryState::Empty,
            _ => BatteryState::Unknown,
        }
    }

    /// 是否处于（或即将）充电状态
    #[inline]
    pub fn is_charging(self) -> bool {
        matches!(self, BatteryState::Charging | BatteryState::PendingCharge)
    }
}

impl std::fmt::Display for BatteryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BatteryState::Unknown => "Unknown",
            BatteryState::Charging => "Charging",
            BatteryState::Discharging => "Discharging",
            BatteryState::Empty => "Empty",
            BatteryState::FullyCharged => "Full",
            BatteryState::PendingCharge => "PendingCharge",
            BatteryState::PendingDischarge => "PendingDischarge",
        };
        f.write_str(name)
    }
}

/// 电池指标快照
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryMetrics {
    /// 剩余电量占总容量的比例 (0.0-1.0)
    pub fraction: f64,
    pub state: BatteryState,
    pub until_empty: Option<Duration>,
    pub until_full: Option<Duration>,
}

impl Default for BatteryMetrics {
    #[inline]
    fn default() -> Self {
        Self {
            fraction: 0.0,
            state: BatteryState::Unknown,
            until_empty: None,
            until_full: None,
        }
    }
}

impl BatteryMetrics {
    /// 充电时为距离充满的时间，否则为距离耗尽的时间
    pub fn remaining(&self) -> Option<Duration> {
        if self.state == BatteryState::Charging {
            self.until_full
        } else {
            self.until_empty
        }
    }
}

/// 电池数据获取错误类型
#[derive(Debug)]
pub enum BatteryError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    NotFound(PathBuf),
}

impl std::fmt::Display for BatteryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryError::IoError(path, e) => write!(f, "读取 {} 失败: {e}", path.display()),
            BatteryError::ParseError(path, s) => {
                write!(f, "解析 {} 失败: {s}", path.display())
            }
            BatteryError::NotFound(dir) => write!(f, "{} 中没有找到电池", dir.display()),
        }
    }
}

impl std::error::Error for BatteryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatteryError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BatteryError>;

/// 基于 sysfs 的电池数据源
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    battery: PathBuf,
    mains: Option<PathBuf>,
    watch_interval: Duration,
}

impl SysfsBattery {
    pub const POWER_SUPPLY: &str = "/sys/class/power_supply";

    /// 在 `root` 下查找第一个电池和第一个外接电源
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let entries = fs::read_dir(root).map_err(|e| BatteryError::IoError(root.into(), e))?;

        let mut supplies = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect::<Vec<_>>();
        supplies.sort();

        let mut battery = None;
        let mut mains = None;
        for path in supplies {
            let kind = match fs::read_to_string(path.join("type")) {
                Ok(kind) => kind,
                Err(e) => {
                    debug!("跳过 {}: {e}", path.display());
                    continue;
                }
            };
            match kind.trim() {
                "Battery" if battery.is_none() => battery = Some(path),
                "Mains" if mains.is_none() => mains = Some(path),
                _ => {}
            }
        }

        let battery = battery.ok_or_else(|| BatteryError::NotFound(root.into()))?;
        info!("使用电池: {}", battery.display());
        match &mains {
            Some(path) => info!("外接电源: {}", path.display()),
            None => info!("未找到外接电源，状态变化只依赖定时刷新"),
        }

        Ok(Self {
            battery,
            mains,
            watch_interval: Duration::from_secs(2),
        })
    }

    /// 设置外接电源状态的检查间隔
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    fn path(&self, name: &str) -> PathBuf {
        self.battery.join(name)
    }

    fn read_string(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path)
            .map(|s| s.trim().to_string())
            .map_err(|e| BatteryError::IoError(path, e))
    }

    fn read_u64(&self, name: &str) -> Result<u64> {
        self.read_string(name)?
            .parse::<u64>()
            .map_err(|e| BatteryError::ParseError(self.path(name), e.to_string()))
    }

    /// 可选的数值文件：文件不存在时返回 `None`
    fn read_optional(&self, name: &str) -> Result<Option<u64>> {
        if !self.path(name).exists() {
            return Ok(None);
        }
        self.read_u64(name).map(Some)
    }

    /// 读取 (当前量, 满量, 功率/电流)，能量与电荷两套接口取其一
    fn read_levels(&self) -> Result<Option<(u64, u64, Option<u64>)>> {
        for (now, full, rate) in [
            ("energy_now", "energy_full", "power_now"),
            ("charge_now", "charge_full", "current_now"),
        ] {
            if let (Some(now), Some(full)) = (self.read_optional(now)?, self.read_optional(full)?)
            {
                return Ok(Some((now, full, self.read_optional(rate)?)));
            }
        }
        Ok(None)
    }

    fn read_metrics(&self) -> Result<BatteryMetrics> {
        let state = BatteryState::from_sysfs_status(&self.read_string("status")?);
        let levels = self.read_levels()?;

        let fraction = match (self.read_optional("capacity")?, levels) {
            (Some(percent), _) => percent as f64 / 100.0,
            (None, Some((now, full, _))) if full > 0 => now as f64 / full as f64,
            _ => {
                return Err(BatteryError::ParseError(
                    self.battery.clone(),
                    "缺少 capacity 与 energy/charge 数据".to_string(),
                ));
            }
        };

        let mut until_empty = self.read_optional("time_to_empty_now")?.map(Duration::from_secs);
        let mut until_full = self.read_optional("time_to_full_now")?.map(Duration::from_secs);

        // 驱动没有直接给出时间时按 当前量/功率 推算
        if let Some((now, full, Some(rate @ 1..))) = levels {
            let hours = |amount: u64| {
                Duration::try_from_secs_f64(amount as f64 / rate as f64 * 3600.0).map_err(|e| {
                    BatteryError::ParseError(self.battery.clone(), format!("剩余时间无效: {e}"))
                })
            };
            if until_empty.is_none() && state == BatteryState::Discharging {
                until_empty = Some(hours(now)?);
            }
            if until_full.is_none() && state == BatteryState::Charging {
                until_full = Some(hours(full.saturating_sub(now))?);
            }
        }

        Ok(BatteryMetrics {
            fraction: fraction.clamp(0.0, 1.0),
            state,
            until_empty,
            until_full,
        })
    }
}

impl SampleSource for SysfsBattery {
    type Sample = BatteryMetrics;
    type Error = BatteryError;

    fn fetch(&self) -> Result<BatteryMetrics> {
        self.read_metrics()
    }

    fn subscribe_state_change(&self) -> Option<StateSubscription> {
        let online = self.mains.as_ref()?.join("online");
        if self.watch_interval.is_zero() {
            warn!("外接电源检查间隔为 0，不监听电源状态");
            return None;
        }
        let runtime = tokio::runtime::Handle::try_current().ok()?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (notify, subscription) = StateSubscription::channel(move || {
            let _ = stop_tx.send(());
        });
        runtime.spawn(watch_online(online, self.watch_interval, notify, stop_rx));

        Some(subscription)
    }
}

/// 轮询外接电源的 `online` 文件，变化时发送通知
///
/// 读取失败时退出并关闭通知通道。
async fn watch_online(
    online: PathBuf,
    interval: Duration,
    notify: mpsc::Sender<()>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut last: Option<String> = None;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let value = match tokio::fs::read_to_string(&online).await {
                    Ok(value) => value.trim().to_string(),
                    Err(e) => {
                        warn!("读取 {} 失败: {e}，停止监听电源状态", online.display());
                        break;
                    }
                };

                let changed = last.as_ref().is_some_and(|prev| *prev != value);
                last = Some(value);
                if !changed {
                    continue;
                }

                debug!("外接电源状态变化");
                match notify.try_send(()) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                    Err(mpsc::error::TrySendError::Closed(())) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: &str) {
        fs::write(dir.join(name), value).unwrap();
    }

    fn fake_supply(with_mains: bool) -> TempDir {
        let td = TempDir::new().unwrap();
        let bat = td.path().join("BAT0");
        fs::create_dir(&bat).unwrap();
        write(&bat, "type", "Battery\n");
        write(&bat, "status", "Discharging\n");
        write(&bat, "capacity", "85\n");
        write(&bat, "energy_now", "42500000\n");
        write(&bat, "energy_full", "50000000\n");
        write(&bat, "power_now", "10000000\n");

        if with_mains {
            let ac = td.path().join("AC");
            fs::create_dir(&ac).unwrap();
            write(&ac, "type", "Mains\n");
            write(&ac, "online", "0\n");
        }
        td
    }

    #[test]
    fn test_state_from_sysfs() {
        assert_eq!(BatteryState::from_sysfs_status("Charging\n"), BatteryState::Charging);
        assert_eq!(BatteryState::from_sysfs_status("Full"), BatteryState::FullyCharged);
        assert_eq!(
            BatteryState::from_sysfs_status("Not charging"),
            BatteryState::PendingCharge
        );
        assert_eq!(BatteryState::from_sysfs_status("???"), BatteryState::Unknown);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BatteryState::FullyCharged.to_string(), "Full");
        assert_eq!(BatteryState::Discharging.to_string(), "Discharging");
        assert_eq!(BatteryState::Charging as i32, 1);
        assert_eq!(BatteryState::PendingDischarge as i32, 6);
    }

    #[test]
    fn test_remaining_follows_state() {
        let mut metrics = BatteryMetrics {
            fraction: 0.5,
            state: BatteryState::Charging,
            until_empty: Some(Duration::from_secs(60)),
            until_full: Some(Duration::from_secs(120)),
        };
        assert_eq!(metrics.remaining(), Some(Duration::from_secs(120)));

        metrics.state = BatteryState::Discharging;
        assert_eq!(metrics.remaining(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_discover_and_read() {
        let td = fake_supply(false);
        let battery = SysfsBattery::discover(td.path()).unwrap();
        let metrics = battery.fetch().unwrap();

        assert!((metrics.fraction - 0.85).abs() < 1e-9);
        assert_eq!(metrics.state, BatteryState::Discharging);
        // 42.5 Wh / 10 W = 4.25 h
        assert_eq!(metrics.until_empty, Some(Duration::from_secs(4 * 3600 + 15 * 60)));
        assert_eq!(metrics.until_full, None);
    }

    #[test]
    fn test_read_prefers_driver_times() {
        let td = fake_supply(false);
        let bat = td.path().join("BAT0");
        write(&bat, "time_to_empty_now", "600\n");

        let metrics = SysfsBattery::discover(td.path()).unwrap().fetch().unwrap();
        assert_eq!(metrics.until_empty, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_read_charging_until_full() {
        let td = fake_supply(false);
        let bat = td.path().join("BAT0");
        write(&bat, "status", "Charging\n");

        let metrics = SysfsBattery::discover(td.path()).unwrap().fetch().unwrap();
        assert_eq!(metrics.state, BatteryState::Charging);
        // (50 - 42.5) Wh / 10 W = 45 min
        assert_eq!(metrics.until_full, Some(Duration::from_secs(45 * 60)));
        assert_eq!(metrics.remaining(), metrics.until_full);
    }

    #[test]
    fn test_read_without_capacity() {
        let td = fake_supply(false);
        fs::remove_file(td.path().join("BAT0/capacity")).unwrap();

        let metrics = SysfsBattery::discover(td.path()).unwrap().fetch().unwrap();
        assert!((metrics.fraction - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_read_malformed() {
        let td = fake_supply(false);
        write(&td.path().join("BAT0"), "capacity", "lots\n");

        let battery = SysfsBattery::discover(td.path()).unwrap();
        assert!(matches!(battery.fetch(), Err(BatteryError::ParseError(_, _))));
    }

    #[test]
    fn test_discover_without_battery() {
        let td = TempDir::new().unwrap();
        let ac = td.path().join("AC");
        fs::create_dir(&ac).unwrap();
        write(&ac, "type", "Mains\n");

        match SysfsBattery::discover(td.path()) {
            Err(BatteryError::NotFound(_)) => {}
            other => panic!("应该是 NotFound，实际: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_mains_no_subscription() {
        let td = fake_supply(false);
        let battery = SysfsBattery::discover(td.path()).unwrap();
        assert!(battery.subscribe_state_change().is_none());
    }

    #[tokio::test]
    async fn test_mains_change_notifies() {
        let td = fake_supply(true);
        let battery = SysfsBattery::discover(td.path())
            .unwrap()
            .with_watch_interval(Duration::from_millis(10));
        let mut sub = battery.subscribe_state_change().unwrap();

        // 等待监听任务读到初始值
        tokio::time::sleep(Duration::from_millis(50)).await;
        write(&td.path().join("AC"), "online", "1\n");

        let notice = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await;
        assert_eq!(notice.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn test_mains_removed_closes_channel() {
        let td = fake_supply(true);
        let battery = SysfsBattery::discover(td.path())
            .unwrap()
            .with_watch_interval(Duration::from_millis(10));
        fs::remove_file(td.path().join("AC/online")).unwrap();

        let mut sub = battery.subscribe_state_change().unwrap();
        let notice = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await;
        assert_eq!(notice.unwrap(), None);
    }

    #[test]
    fn test_read_absurd_rate() {
        let td = fake_supply(false);
        let bat = td.path().join("BAT0");
        write(&bat, "energy_now", &format!("{}\n", u64::MAX));
        write(&bat, "power_now", "1\n");

        let battery = SysfsBattery::discover(td.path()).unwrap();
        assert!(matches!(battery.fetch(), Err(BatteryError::ParseError(_, _))));
    }

    #[tokio::test]
    async fn test_zero_watch_interval_no_subscription() {
        let td = fake_supply(true);
        let battery = SysfsBattery::discover(td.path())
            .unwrap()
            .with_watch_interval(Duration::ZERO);
        assert!(battery.subscribe_state_change().is_none());
    }
}
