//! 核心层：错误、定时器调度、会话上下文、状态投影、主控循环

pub mod error;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod timer;

pub use error::GameError;
pub use orchestrator::{create_game, Command, GameOptions};
pub use session::{SessionContext, UserId};
pub use state::{Badge, BookView, LevelView, PageView, Screen, StageView, UiState};
pub use timer::{ManualScheduler, Scheduler, TimerFired, TimerHandle, TimerId, TimerKind, TokioScheduler};
