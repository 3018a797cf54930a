//! 显示格式轮换
//!
//! 按固定间隔在一组格式之间轮换，当前格式通过 `watch` 通道提供给订阅者。
//! 订阅者每个格式最多收到一次；读取较慢时会直接看到最新的格式。

use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 轮换器创建错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotatorError {
    Empty,
    ZeroInterval,
}

impl std::fmt::Display for RotatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotatorError::Empty => write!(f, "至少需要一个显示格式"),
            RotatorError::ZeroInterval => write!(f, "轮换间隔必须大于 0"),
        }
    }
}

impl std::error::Error for RotatorError {}

/// 格式轮换器句柄
pub struct FormatRotator {
    index: Arc<AtomicUsize>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// 格式订阅端
pub struct FormatSubscriber<F> {
    rx: watch::Receiver<Option<F>>,
}

impl FormatRotator {
    /// 启动轮换任务
    pub fn spawn<F>(
        interval: Duration,
        items: Vec<F>,
    ) -> Result<(Self, FormatSubscriber<F>), RotatorError>
    where
        F: Clone + Send + Sync + 'static,
    {
        let first = items.first().cloned().ok_or(RotatorError::Empty)?;
        if interval.is_zero() {
            return Err(RotatorError::ZeroInterval);
        }

        // 初始值为空，再发布第一个格式，使订阅者能收到它
        let (tx, rx) = watch::channel(None);
        tx.send_replace(Some(first));

        let index = Arc::new(AtomicUsize::new(0));
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(rotate(items, interval, tx, index.clone(), stop_rx));

        let rotator = Self {
            index,
            stop: Some(stop_tx),
            task: Some(task),
        };
        Ok((rotator, FormatSubscriber { rx }))
    }

    /// 当前格式的下标
    pub fn current_index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// 停止轮换并等待任务退出，可重复调用
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("格式轮换任务异常退出: {e}");
            }
            debug!("格式轮换已停止");
        }
    }
}

impl Drop for FormatRotator {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn rotate<F: Clone>(
    items: Vec<F>,
    interval: Duration,
    tx: watch::Sender<Option<F>>,
    index: Arc<AtomicUsize>,
    mut stop: oneshot::Receiver<()>,
) {
    // 只有一个格式时无需定时器
    if items.len() == 1 {
        tokio::select! {
            _ = &mut stop => {}
            _ = tx.closed() => {}
        }
        return;
    }

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut current = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = tx.closed() => {
                debug!("格式订阅者已关闭");
                break;
            }
            _ = ticker.tick() => {
                current = (current + 1) % items.len();
                index.store(current, Ordering::Release);
                tx.send_replace(Some(items[current].clone()));
            }
        }
    }
}

impl<F: Clone> FormatSubscriber<F> {
    /// 等待下一个（尚未读取过的）格式；轮换器停止后返回 `None`
    pub async fn next(&mut self) -> Option<F> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// 查看当前格式，不标记为已读
    pub fn current(&self) -> Option<F> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    const T: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_rotates_round_robin() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A", "B", "C"]).unwrap();

        let mut seen = vec![formats.next().await.unwrap()];
        for _ in 0..5 {
            sleep(T).await;
            seen.push(formats.next().await.unwrap());
        }
        assert_eq!(seen, vec!["A", "B", "C", "A", "B", "C"]);

        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_format() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A"]).unwrap();

        assert_eq!(formats.next().await, Some("A"));

        // 同一个值不会被重复推送
        let again = timeout(T * 10, formats.next()).await;
        assert!(again.is_err());
        assert_eq!(formats.current(), Some("A"));
        assert_eq!(rotator.current_index(), 0);

        rotator.stop().await;
    }

    #[tokio::test]
    async fn test_empty_formats() {
        let result = FormatRotator::spawn::<&str>(T, vec![]);
        assert_eq!(result.err(), Some(RotatorError::Empty));
        assert_eq!(RotatorError::Empty.to_string(), "至少需要一个显示格式");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_sees_latest() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A", "B", "C"]).unwrap();

        sleep(T * 2 + T / 2).await;
        assert_eq!(formats.next().await, Some("C"));
        assert_eq!(rotator.current_index(), 2);

        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_offered_once_per_change() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A", "B"]).unwrap();

        assert_eq!(formats.next().await, Some("A"));
        // 下一个值只有在轮换后才可读
        let pending = timeout(T / 2, formats.next()).await;
        assert!(pending.is_err());
        assert_eq!(formats.next().await, Some("B"));

        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_subscriber() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A", "B"]).unwrap();
        assert_eq!(formats.next().await, Some("A"));

        timeout(T, rotator.stop()).await.expect("停止应在有限时间内完成");
        assert_eq!(formats.next().await, None);

        // 重复停止是安全的
        rotator.stop().await;
    }

    #[tokio::test]
    async fn test_zero_interval() {
        let result = FormatRotator::spawn(Duration::ZERO, vec!["A", "B"]);
        assert_eq!(result.err(), Some(RotatorError::ZeroInterval));

        // 单个格式同样拒绝
        let result = FormatRotator::spawn(Duration::ZERO, vec!["A"]);
        assert_eq!(result.err(), Some(RotatorError::ZeroInterval));
        assert_eq!(RotatorError::ZeroInterval.to_string(), "轮换间隔必须大于 0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_task_alive_until_stop() {
        let (mut rotator, mut formats) = FormatRotator::spawn(T, vec!["A", "B"]).unwrap();
        assert_eq!(formats.next().await, Some("A"));
        assert_eq!(formats.next().await, Some("B"));

        let task = rotator.task.as_ref().unwrap();
        assert!(!task.is_finished());

        rotator.stop().await;
        assert!(rotator.task.is_none());
    }
}
