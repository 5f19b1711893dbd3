//! 定时调度：可取消的延迟回调
//!
//! 翻页完成、打字揭示、抖动起止都是定时事件。每次 schedule 返回一个 TimerHandle，
//! 持有者负责在离开所属状态时 cancel。触发事件携带 TimerId，持有者只认自己当前持有的那个 id，
//! 因此即使触发与取消发生竞争（事件已入队后才取消），过期事件也不会被观察到。
//!
//! - `TokioScheduler`：真实时间，每个定时器一个 tokio 任务，经 mpsc 回送 `TimerFired`
//! - `ManualScheduler`：虚拟时钟，测试与无头宿主用，按截止时间顺序逐个弹出

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 定时器 ID（单个调度器内单调递增）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct TimerId(u64);

/// 定时器用途
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TimerKind {
    /// 翻页动画结束，提交页码
    FlipComplete,
    /// 当前台词打字结束，显示「下一步」
    TypingReveal,
    /// 抖动脉冲在下一帧重新开启
    ShakeStart,
    /// 抖动脉冲自动关闭
    ShakeReset,
}

/// 已调度定时器的句柄；不可复制，取消时按值交还调度器
#[derive(Debug, PartialEq, Eq)]
pub struct TimerHandle {
    id: TimerId,
    kind: TimerKind,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// 该触发事件是否属于本句柄
    pub fn matches(&self, fired: &TimerFired) -> bool {
        self.id == fired.id
    }
}

/// 定时器到期事件
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

/// 调度器 trait：状态机只依赖这一接口，不关心底层如何计时
pub trait Scheduler {
    /// 在 delay 之后投递一次 `TimerFired`
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// 取消尚未触发的定时器；已触发或已取消时为 no-op
    fn cancel(&mut self, handle: TimerHandle);

    /// 宿主在分发某个触发事件前调用，释放其簿记
    fn retire(&mut self, _id: TimerId) {}

    /// 仍在等待触发的定时器数量
    fn pending(&self) -> usize;
}

/// 基于 tokio 的调度器
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerFired>,
    /// 所有定时器 token 的父 token，shutdown 时一并取消
    root: CancellationToken,
    tokens: HashMap<TimerId, CancellationToken>,
    next_id: u64,
}

impl TokioScheduler {
    /// 创建调度器，返回触发事件接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(tx), rx)
    }

    pub fn with_sender(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx,
            root: CancellationToken::new(),
            tokens: HashMap::new(),
            next_id: 0,
        }
    }

    /// 取消全部未触发的定时器（宿主退出时）
    pub fn shutdown(&mut self) {
        self.root.cancel();
        self.tokens.clear();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let token = self.root.child_token();
        self.tokens.insert(id, token.clone());
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(TimerFired { id, kind });
                }
            }
        });

        tracing::debug!(?id, ?kind, delay_ms = delay.as_millis() as u64, "timer scheduled");
        TimerHandle { id, kind }
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(token) = self.tokens.remove(&handle.id) {
            token.cancel();
            tracing::debug!(id = ?handle.id, kind = ?handle.kind, "timer canceled");
        }
    }

    fn retire(&mut self, id: TimerId) {
        self.tokens.remove(&id);
    }

    fn pending(&self) -> usize {
        self.tokens.len()
    }
}

/// 虚拟时钟调度器：时间只在调用方推进时流逝
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    next_id: u64,
    /// (截止时间, id) -> 用途；BTreeMap 保证按截止时间、再按调度顺序弹出
    queue: BTreeMap<(u64, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, u64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// 弹出截止时间不晚于 until_ms 的最早定时器，并把时钟推进到它的截止时间
    pub fn pop_due(&mut self, until_ms: u64) -> Option<TimerFired> {
        let (&(deadline, id), _) = self.queue.iter().next()?;
        if deadline > until_ms {
            return None;
        }
        let kind = self.queue.remove(&(deadline, id))?;
        self.deadlines.remove(&id);
        self.now_ms = self.now_ms.max(deadline);
        Some(TimerFired { id, kind })
    }

    /// 推进 ms 毫秒，依次把到期事件交给 dispatch；dispatch 中新调度的定时器若在窗口内到期也会被分发
    pub fn run_for<F>(&mut self, ms: u64, mut dispatch: F)
    where
        F: FnMut(&mut Self, TimerFired),
    {
        let until = self.now_ms + ms;
        while let Some(fired) = self.pop_due(until) {
            dispatch(self, fired);
        }
        self.now_ms = until;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = self.now_ms + delay.as_millis() as u64;
        self.queue.insert((deadline, id), kind);
        self.deadlines.insert(id, deadline);
        TimerHandle { id, kind }
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(deadline) = self.deadlines.remove(&handle.id) {
            self.queue.remove(&(deadline, handle.id));
        }
    }

    fn pending(&self) -> usize {
        self.deadlines.len()
    }
}
