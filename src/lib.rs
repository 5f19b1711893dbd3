//! Chronicle - 翻书选关 + 对话解谜的叙事关卡客户端
//!
//! 模块划分：
//! - **api**: 后端契约（GameBackend）与 HTTP / 进程内实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、定时器调度、会话上下文、UiState 投影、主控循环
//! - **narrator**: 单关叙事状态机（打字对话 → 钥匙输入 → 提交 → 奖励）
//! - **navigator**: 翻书选关状态机与解锁/完成派生集合
//! - **observability**: tracing 订阅器初始化
//! - **ui**: Ratatui TUI 界面

pub mod api;
pub mod config;
pub mod core;
pub mod narrator;
pub mod navigator;
pub mod observability;
pub mod ui;
