//! Chronicle - 翻书选关 + 对话解谜的叙事关卡客户端
//!
//! 入口：加载配置、初始化日志、登录得到会话上下文、创建游戏编排器与 TUI，并运行主循环。
//! 用法：`chronicle [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chronicle::{
    api::{AuthRequest, GameBackend, HttpBackend, MockBackend},
    config::{load_config, AppConfig},
    core::{create_game, GameOptions, SessionContext},
    observability,
    ui::run_app,
};

/// 按配置登录或注册，得到会话上下文
async fn authenticate(backend: &dyn GameBackend, cfg: &AppConfig) -> anyhow::Result<SessionContext> {
    let req = AuthRequest {
        email: cfg.session.email.clone(),
        username: cfg.session.username.clone(),
    };
    let resp = if cfg.session.register {
        backend.register(&req).await
    } else {
        backend.login(&req).await
    }
    .with_context(|| format!("Failed to sign in as {}", req.username))?;
    tracing::info!(user_id = resp.id, credits = resp.credits, "signed in");
    Ok(resp.into_session(&req))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let loaded = load_config(config_path);
    let cfg = loaded.as_ref().cloned().unwrap_or_default();

    observability::init(cfg.app.log_file.as_deref()).context("Failed to init logging")?;
    if let Err(e) = &loaded {
        tracing::warn!("Config load failed ({}), using defaults", e);
    }

    let backend: Arc<dyn GameBackend> = if cfg.demo.offline {
        tracing::info!("Offline demo: using in-process campaign");
        Arc::new(MockBackend::campaign())
    } else {
        tracing::info!(base_url = %cfg.api.base_url, "Using HTTP backend");
        Arc::new(
            HttpBackend::new(cfg.api.base_url.clone(), cfg.api.request_timeout_secs)
                .context("Failed to build HTTP client")?,
        )
    };

    let session = authenticate(backend.as_ref(), &cfg).await?;

    // 命令发送端交给 TUI；状态接收端供每帧渲染
    let (cmd_tx, state_rx, game) = create_game(backend, session, GameOptions::from_config(&cfg));

    run_app(state_rx, cmd_tx).await.context("App run failed")?;

    // TUI 退出后等待编排器完成卸载
    game.await.context("Game loop failed")?;
    Ok(())
}
