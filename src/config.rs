//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHRONICLE__*` 覆盖（双下划线表示嵌套，如 `CHRONICLE__API__BASE_URL=http://host:8000`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::narrator::{NarratorTiming, DEFAULT_REVEAL_MS, DEFAULT_SHAKE_MS};
use crate::navigator::DEFAULT_FLIP_MS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub api: ApiSection,
    pub timing: TimingSection,
    pub session: SessionSection,
    pub assets: AssetsSection,
    pub demo: DemoSection,
}

/// [app] 段：应用名、日志文件
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 设置后日志写入该文件（终端归 TUI 所有），否则写 stderr
    pub log_file: Option<PathBuf>,
}

/// [api] 段：后端地址与请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// [timing] 段：翻页、打字揭示、抖动时长（毫秒）
#[derive(Debug, Clone, Deserialize)]
pub struct TimingSection {
    #[serde(default = "default_flip_ms")]
    pub flip_ms: u64,
    #[serde(default = "default_reveal_ms")]
    pub reveal_ms: u64,
    #[serde(default = "default_shake_ms")]
    pub shake_ms: u64,
}

fn default_flip_ms() -> u64 {
    DEFAULT_FLIP_MS
}

fn default_reveal_ms() -> u64 {
    DEFAULT_REVEAL_MS
}

fn default_shake_ms() -> u64 {
    DEFAULT_SHAKE_MS
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            flip_ms: DEFAULT_FLIP_MS,
            reveal_ms: DEFAULT_REVEAL_MS,
            shake_ms: DEFAULT_SHAKE_MS,
        }
    }
}

impl TimingSection {
    pub fn flip(&self) -> Duration {
        Duration::from_millis(self.flip_ms)
    }

    pub fn narrator(&self) -> NarratorTiming {
        NarratorTiming {
            reveal: Duration::from_millis(self.reveal_ms),
            shake: Duration::from_millis(self.shake_ms),
        }
    }
}

/// [session] 段：登录身份；register = true 时先注册
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_email")]
    pub email: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub register: bool,
}

fn default_email() -> String {
    crate::api::mock::DEMO_EMAIL.to_string()
}

fn default_username() -> String {
    crate::api::mock::DEMO_USERNAME.to_string()
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            email: default_email(),
            username: default_username(),
            register: false,
        }
    }
}

/// [assets] 段：关卡序号 → 插图路径
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsSection {
    #[serde(default = "default_images")]
    pub images: HashMap<String, String>,
}

fn default_images() -> HashMap<String, String> {
    ["pyramid", "nile", "valley", "karnak", "chamber"]
        .iter()
        .enumerate()
        .map(|(i, name)| ((i + 1).to_string(), format!("assets/levels/{}.jpg", name)))
        .collect()
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            images: default_images(),
        }
    }
}

impl AssetsSection {
    /// 键不是数字的条目被忽略
    pub fn image_map(&self) -> HashMap<u32, String> {
        self.images
            .iter()
            .filter_map(|(k, v)| k.trim().parse::<u32>().ok().map(|n| (n, v.clone())))
            .collect()
    }
}

/// [demo] 段：offline = true 时使用进程内的演示后端
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DemoSection {
    #[serde(default)]
    pub offline: bool,
}

/// 从 config 目录加载配置，环境变量 CHRONICLE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHRONICLE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHRONICLE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
