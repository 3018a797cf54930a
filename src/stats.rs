use crate::source::SampleSource;
use std::path::PathBuf;
use std::time::Instant;

/// 空闲模式在 `/proc/stat` 计数向量中的下标
pub const MODE_IDLE: usize = 3;

/// 单个处理器的各模式时间计数（单位 USER_HZ）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CpuTime {
    /// 条目名称，例如 `cpu`、`cpu0`
    pub name: String,
    /// user, nice, system, idle, iowait, irq, softirq, steal, guest, guest_nice
    pub in_mode: Vec<u64>,
}

/// 一次 `/proc/stat` 采样
#[derive(Debug, Clone)]
pub struct CpuSnapshot {
    pub cpus: Vec<CpuTime>,
    pub taken_at: Instant,
}

impl CpuSnapshot {
    /// 当前采样中的处理器名称列表
    pub fn names(&self) -> Vec<&str> {
        self.cpus.iter().map(|cpu| cpu.name.as_str()).collect()
    }
}

/// 系统资源获取错误类型
#[derive(Debug)]
pub enum StatsError {
    IoError(std::io::Error),
    ParseError(String),
}

impl From<std::io::Error> for StatsError {
    #[inline]
    fn from(error: std::io::Error) -> Self {
        StatsError::IoError(error)
    }
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::IoError(e) => write!(f, "IO 错误: {e}"),
            StatsError::ParseError(s) => write!(f, "解析错误: {s}"),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::IoError(e) => Some(e),
            StatsError::ParseError(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

/// 判断一行是否为处理器条目（`cpu` 或 `cpuN`）
#[inline]
fn is_cpu_line(name: &str) -> bool {
    name.strip_prefix("cpu")
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

/// 解析 `/proc/stat` 中的处理器时间计数
pub fn parse_cpu_times(content: &str) -> Result<Vec<CpuTime>> {
    let mut times = Vec::new();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            continue;
        };
        if !is_cpu_line(name) {
            continue;
        }

        let in_mode = parts
            .map(|piece| piece.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| StatsError::ParseError(format!("无法解析行: {line:?}")))?;

        times.push(CpuTime {
            name: name.to_string(),
            in_mode,
        });
    }

    if times.is_empty() {
        return Err(StatsError::ParseError("未找到处理器条目".to_string()));
    }

    Ok(times)
}

/// 基于 `/proc/stat` 的处理器数据源
#[derive(Debug, Clone)]
pub struct ProcStat {
    path: PathBuf,
}

impl Default for ProcStat {
    #[inline]
    fn default() -> Self {
        Self::new(Self::STAT)
    }
}

impl ProcStat {
    const STAT: &str = "/proc/stat";

    /// 使用指定路径创建数据源
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 读取一次处理器快照
    pub fn read(&self) -> Result<CpuSnapshot> {
        let content = std::fs::read_to_string(&self.path)?;
        let cpus = parse_cpu_times(&content)?;
        Ok(CpuSnapshot {
            cpus,
            taken_at: Instant::now(),
        })
    }
}

impl SampleSource for ProcStat {
    type Sample = CpuSnapshot;
    type Error = StatsError;

    fn fetch(&self) -> Result<CpuSnapshot> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const STAT: &str = "\
cpu  1234 567 890 1234 10 0 5 0 0 0
cpu0 600 300 400 600 5 0 2 0 0 0
cpu1 634 267 490 634 5 0 3 0 0 0
intr 123456 0 0
ctxt 987654
btime 1700000000
processes 4242
";

    #[test]
    fn test_parse_cpu_times_valid() {
        let times = parse_cpu_times(STAT).unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0].name, "cpu");
        assert_eq!(times[0].in_mode, vec![1234, 567, 890, 1234, 10, 0, 5, 0, 0, 0]);
        assert_eq!(times[1].name, "cpu0");
        assert_eq!(times[2].name, "cpu1");
        assert_eq!(times[2].in_mode[MODE_IDLE], 634);
    }

    #[test]
    fn test_parse_cpu_times_skips_lookalikes() {
        let content = "cpu 1 2 3 4\ncpufreq 9 9 9 9\ncpu7 5 6 7 8\n";
        let times = parse_cpu_times(content).unwrap();
        let names: Vec<_> = times.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cpu", "cpu7"]);
    }

    #[test]
    fn test_parse_cpu_times_invalid_counter() {
        let content = "cpu 1 2 x 4";
        match parse_cpu_times(content) {
            Err(StatsError::ParseError(msg)) => assert!(msg.contains("cpu 1 2 x 4")),
            other => panic!("应该是 ParseError，实际: {other:?}"),
        }
    }

    #[test]
    fn test_parse_cpu_times_empty() {
        assert!(parse_cpu_times("").is_err());
        assert!(parse_cpu_times("intr 1 2 3").is_err());
    }

    #[test]
    fn test_stats_error_display() {
        let io_error = StatsError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "test error",
        ));
        assert_eq!(format!("{}", io_error), "IO 错误: test error");

        let parse_error = StatsError::ParseError("test parse error".to_string());
        assert_eq!(format!("{}", parse_error), "解析错误: test parse error");
    }

    #[test]
    fn test_stats_error_from_io() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let stats_error = StatsError::from(io_error);
        match stats_error {
            StatsError::IoError(_) => {} // 预期的类型
            _ => panic!("应该是 IoError 类型"),
        }
    }

    #[test]
    fn test_proc_stat_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(STAT.as_bytes()).unwrap();

        let source = ProcStat::new(file.path());
        let snapshot = source.fetch().unwrap();
        assert_eq!(snapshot.names(), vec!["cpu", "cpu0", "cpu1"]);
    }

    #[test]
    fn test_proc_stat_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = ProcStat::new(dir.path().join("stat"));
        assert!(matches!(source.fetch(), Err(StatsError::IoError(_))));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_proc_stat_live() {
        // 在某些环境中可能失败，这是可以接受的
        match ProcStat::default().read() {
            Ok(snapshot) => {
                assert!(!snapshot.cpus.is_empty());
                assert_eq!(snapshot.cpus[0].name, "cpu");
            }
            Err(e) => println!("读取 /proc/stat 失败: {e}"),
        }
    }
}
