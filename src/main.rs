use anyhow::Result;
use clap::{Parser, Subcommand};
use dockapp_monitor::geometry::Rect;
use dockapp_monitor::{BatteryConfig, CpuConfig, battery_main, cpu_main};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

/// Dockapp 资源指示器
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 电池电量指示器
    Battery(BatteryArgs),
    /// 处理器占用指示器
    Cpu(CpuArgs),
}

#[derive(clap::Args, Debug)]
struct BatteryArgs {
    /// 窗口几何描述
    #[arg(long, default_value = "117x20")]
    window: Rect,

    /// 电池图标区域
    #[arg(long, default_value = "21x18+1+2")]
    battery: Rect,

    /// 文本区域
    #[arg(long, default_value = "95x20+22+0")]
    text: Rect,

    /// 电池外壳线宽
    #[arg(long, default_value_t = 1)]
    border: i32,

    /// 电池数据刷新间隔秒数
    #[arg(short, long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    poll: u64,

    /// 文本格式轮换间隔毫秒数
    #[arg(short = 'i', long, default_value_t = 7500, value_parser = clap::value_parser!(u64).range(1..))]
    text_interval: u64,

    /// 外接电源状态检查间隔毫秒数
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    watch_interval: u64,

    /// sysfs 电源目录
    #[arg(long, default_value = "/sys/class/power_supply")]
    power_supply: PathBuf,

    /// 终端字符列数
    #[arg(long, default_value_t = 40)]
    columns: usize,

    /// 终端字符行数
    #[arg(long, default_value_t = 3)]
    rows: usize,

    /// 轮换显示的模板，例如 "{percent} {remaining}"
    templates: Vec<String>,
}

impl From<BatteryArgs> for BatteryConfig {
    fn from(args: BatteryArgs) -> Self {
        Self {
            window: args.window,
            battery: args.battery,
            text: args.text,
            border: args.border,
            poll_interval: Duration::from_secs(args.poll),
            text_interval: Duration::from_millis(args.text_interval),
            watch_interval: Duration::from_millis(args.watch_interval),
            power_supply_dir: args.power_supply,
            templates: args.templates,
            columns: args.columns,
            rows: args.rows,
            ..Default::default()
        }
    }
}

#[derive(clap::Args, Debug)]
struct CpuArgs {
    /// 窗口几何描述
    #[arg(long, default_value = "100x20")]
    window: Rect,

    /// 刷新间隔毫秒数
    #[arg(short, long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    poll: u64,

    /// 不显示的处理器，可重复指定
    #[arg(long, default_value = "cpu")]
    ignore: Vec<String>,

    /// 处理器统计文件
    #[arg(long, default_value = "/proc/stat")]
    stat: PathBuf,

    /// 终端字符列数
    #[arg(long, default_value_t = 40)]
    columns: usize,

    /// 终端字符行数
    #[arg(long, default_value_t = 4)]
    rows: usize,
}

impl From<CpuArgs> for CpuConfig {
    fn from(args: CpuArgs) -> Self {
        Self {
            window: args.window,
            poll_interval: Duration::from_millis(args.poll),
            ignore: args.ignore,
            stat_path: args.stat,
            columns: args.columns,
            rows: args.rows,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    init_logger(&args.log_level);

    info!("Dockapp 资源指示器启动中...");

    match args.command {
        Command::Battery(args) => battery_main(args.into()).await,
        Command::Cpu(args) => cpu_main(args.into()).await,
    }
}

/// 初始化日志系统
fn init_logger(level: &str) {
    match env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init()
    {
        Ok(_) => info!("日志系统初始化成功，级别: {level}"),
        Err(e) => {
            eprintln!("日志系统初始化失败: {e}，使用默认设置");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_args() {
        let args = Args::try_parse_from(["dockapp", "battery", "-i", "5000", "{percent}"]).unwrap();
        let Command::Battery(battery) = args.command else {
            panic!("应解析为 battery 子命令");
        };
        let config = BatteryConfig::from(battery);
        assert_eq!(config.text_interval, Duration::from_secs(5));
        assert_eq!(config.templates, vec!["{percent}".to_string()]);
        assert_eq!(config.window, Rect::new(0, 0, 117, 20));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_cpu_args() {
        let args = Args::try_parse_from([
            "dockapp", "cpu", "--window", "64x16+2+2", "--ignore", "cpu", "--ignore", "cpu7",
            "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(args.log_level, "debug");
        let Command::Cpu(cpu) = args.command else {
            panic!("应解析为 cpu 子命令");
        };
        let config = CpuConfig::from(cpu);
        assert_eq!(config.window, Rect::new(2, 2, 66, 18));
        assert_eq!(config.ignore, vec!["cpu".to_string(), "cpu7".to_string()]);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(Args::try_parse_from(["dockapp", "cpu", "--window", "1e3"]).is_err());
        assert!(Args::try_parse_from(["dockapp", "cpu", "--window", "2147483647x1+1+0"]).is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        for argv in [
            &["dockapp", "battery", "--poll", "0"][..],
            &["dockapp", "battery", "-i", "0"][..],
            &["dockapp", "battery", "--watch-interval", "0"][..],
            &["dockapp", "cpu", "--poll", "0"][..],
        ] {
            assert!(Args::try_parse_from(argv).is_err(), "{argv:?} 应被拒绝");
        }
        assert!(Args::try_parse_from(["dockapp", "cpu", "--poll", "1"]).is_ok());
    }
}
