//! 数据源抽象
//!
//! 数据源提供同步的 `fetch` 调用（可能阻塞），并可选地提供"状态变化"推送通知。

use std::fmt::Display;
use tokio::sync::mpsc;

/// 原始采样数据源
pub trait SampleSource: Send + Sync + 'static {
    /// 一次采样的快照类型
    type Sample: Clone + Send + Sync + 'static;
    /// 采样错误类型
    type Error: Display + Send + 'static;

    /// 读取当前的原始采样（同步，可能较慢）
    fn fetch(&self) -> Result<Self::Sample, Self::Error>;

    /// 订阅外部连接状态变化通知
    ///
    /// 默认不支持推送，协调器只按定时器刷新。
    fn subscribe_state_change(&self) -> Option<StateSubscription> {
        None
    }
}

/// 状态变化通知订阅
///
/// 通知通道只有一个槽位；订阅被释放时执行取消订阅动作。
pub struct StateSubscription {
    notifications: mpsc::Receiver<()>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl StateSubscription {
    /// 创建单槽位通知通道，返回发送端与订阅
    pub fn channel<U>(unsubscribe: U) -> (mpsc::Sender<()>, Self)
    where
        U: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let subscription = Self {
            notifications: rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        };
        (tx, subscription)
    }

    /// 等待下一次通知；返回 `None` 表示数据源已关闭通道
    pub async fn recv(&mut self) -> Option<()> {
        self.notifications.recv().await
    }

    /// 取消订阅，可重复调用
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.notifications.close();
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for StateSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSubscription")
            .field("subscribed", &self.unsubscribe.is_some())
            .finish()
    }
}
