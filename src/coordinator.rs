//! 刷新协调器
//!
//! 定时器或状态变化通知触发采样；同一时刻最多只有一次采样在进行，
//! 进行中到达的触发会被合并丢弃。最新结果保存在加锁的单元中，并通过
//! `watch` 通道非阻塞地发布给订阅者。

use crate::source::{SampleSource, StateSubscription};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

/// 最新刷新结果的快照
#[derive(Debug, Clone)]
pub struct Latest<T> {
    /// 最近一次成功采样
    pub sample: Option<T>,
    /// 最近一次失败的错误信息，成功后清空
    pub last_error: Option<String>,
    /// 最近一次成功采样的时间
    pub updated_at: Option<Instant>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            sample: None,
            last_error: None,
            updated_at: None,
        }
    }
}

impl<T: Clone> Latest<T> {
    /// 记录一次采样结果，成功时返回需要发布的值
    fn record(&mut self, outcome: Outcome<T>) -> Option<T> {
        match outcome {
            Ok(sample) => {
                self.sample = Some(sample.clone());
                self.last_error = None;
                self.updated_at = Some(Instant::now());
                Some(sample)
            }
            Err(e) => {
                error!("刷新失败: {e}");
                self.last_error = Some(e);
                None
            }
        }
    }
}

/// 协调器启动错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    ZeroInterval,
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::ZeroInterval => write!(f, "刷新间隔必须大于 0"),
        }
    }
}

impl std::error::Error for CoordinatorError {}

type Outcome<T> = Result<T, String>;
type Reply<T> = oneshot::Sender<Option<T>>;
type Cell<T> = Arc<Mutex<Latest<T>>>;

#[inline]
fn lock<T>(cell: &Mutex<Latest<T>>) -> MutexGuard<'_, Latest<T>> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 在阻塞线程池上执行一次采样
async fn fetch<S: SampleSource>(source: Arc<S>) -> Outcome<S::Sample> {
    match tokio::task::spawn_blocking(move || source.fetch()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("采样任务异常退出: {e}")),
    }
}

/// 周期刷新协调器
pub struct RefreshCoordinator<S: SampleSource> {
    latest: Cell<S::Sample>,
    updates: watch::Receiver<Option<S::Sample>>,
    pulls: mpsc::Sender<Reply<S::Sample>>,
    fetching: Arc<AtomicBool>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<S: SampleSource> RefreshCoordinator<S> {
    /// 启动协调器
    ///
    /// 返回前先完成一次预热采样，保证第一次读取不是空值（除非预热失败）。
    /// 刷新间隔为 0 时返回 [`CoordinatorError::ZeroInterval`]，不会采样。
    pub async fn start(source: S, interval: Duration) -> Result<Self, CoordinatorError> {
        if interval.is_zero() {
            return Err(CoordinatorError::ZeroInterval);
        }
        let source = Arc::new(source);

        // 推送能力只在启动时探测一次
        let subscription = source.subscribe_state_change();
        match subscription {
            Some(_) => info!("数据源支持状态变化通知"),
            None => debug!("数据源不支持状态变化通知，仅定时刷新"),
        }

        let mut latest = Latest::default();
        latest.record(fetch(source.clone()).await);

        let (updates_tx, updates_rx) = watch::channel(latest.sample.clone());
        let latest = Arc::new(Mutex::new(latest));
        let (pulls_tx, pulls_rx) = mpsc::channel(8);
        let (done_tx, done_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = oneshot::channel();
        let fetching = Arc::new(AtomicBool::new(false));

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let refresh = RefreshLoop {
            source,
            latest: latest.clone(),
            updates: updates_tx,
            subscription,
            pulls: pulls_rx,
            fetching: fetching.clone(),
            done_tx,
            done_rx,
            ticker,
        };
        let task = tokio::spawn(refresh.run(stop_rx));

        Ok(Self {
            latest,
            updates: updates_rx,
            pulls: pulls_tx,
            fetching,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    /// 订阅发布的最新值
    pub fn subscribe(&self) -> watch::Receiver<Option<S::Sample>> {
        self.updates.clone()
    }

    /// 加锁读取最新结果的副本
    pub fn latest(&self) -> Latest<S::Sample> {
        lock(&self.latest).clone()
    }

    /// 通过协调器任务同步获取最新值，不会触发额外采样
    ///
    /// 协调器已停止时直接读取加锁单元。
    pub async fn get_latest(&self) -> Option<S::Sample> {
        let (reply, answer) = oneshot::channel();
        if self.pulls.send(reply).await.is_ok() {
            if let Ok(sample) = answer.await {
                return sample;
            }
        }
        self.latest().sample
    }

    /// 是否有采样正在进行
    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    /// 停止协调器并等待后台任务退出，可重复调用
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("刷新任务异常退出: {e}");
            }
            info!("刷新协调器已停止");
        }
    }
}

impl<S: SampleSource> Drop for RefreshCoordinator<S> {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// 协调器后台任务的状态
struct RefreshLoop<S: SampleSource> {
    source: Arc<S>,
    latest: Cell<S::Sample>,
    updates: watch::Sender<Option<S::Sample>>,
    subscription: Option<StateSubscription>,
    pulls: mpsc::Receiver<Reply<S::Sample>>,
    fetching: Arc<AtomicBool>,
    done_tx: mpsc::Sender<Outcome<S::Sample>>,
    done_rx: mpsc::Receiver<Outcome<S::Sample>>,
    ticker: Interval,
}

async fn next_notice(subscription: &mut Option<StateSubscription>) -> Option<()> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

impl<S: SampleSource> RefreshLoop<S> {
    async fn run(mut self, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                // 发送端被丢弃同样视为停止
                _ = &mut stop => break,
                notice = next_notice(&mut self.subscription) => match notice {
                    Some(()) => self.trigger("状态变化"),
                    None => {
                        warn!("状态通知通道已关闭，改为仅定时刷新");
                        self.subscription = None;
                    }
                },
                _ = self.ticker.tick() => self.trigger("定时器"),
                Some(outcome) = self.done_rx.recv() => self.complete(outcome),
                Some(reply) = self.pulls.recv() => {
                    let _ = reply.send(lock(&self.latest).sample.clone());
                }
            }
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        // 仍在进行的采样结果会被丢弃
        self.fetching.store(false, Ordering::Release);
        debug!("刷新任务退出");
    }

    /// 空闲时发起一次异步采样；已有采样进行中则合并
    fn trigger(&mut self, reason: &str) {
        if self.fetching.swap(true, Ordering::AcqRel) {
            debug!("{reason}触发的刷新已合并：采样仍在进行");
            return;
        }
        debug!("{reason}触发刷新");

        let source = self.source.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch(source).await;
            // 协调器已停止时结果被丢弃
            let _ = done.send(outcome).await;
        });
    }

    fn complete(&mut self, outcome: Outcome<S::Sample>) {
        self.fetching.store(false, Ordering::Release);
        let published = lock(&self.latest).record(outcome);
        if let Some(sample) = published {
            self.updates.send_replace(Some(sample));
        }
    }
}
