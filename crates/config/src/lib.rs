//! 统一配置中心
//!
//! 加载顺序（后者覆盖前者）：
//! - 内置默认值
//! - `CHATROOM_CONFIG` 指定的 TOML 文件（默认 `chatroom.toml`，不存在时跳过）
//! - `CHATROOM_` 前缀的环境变量，层级用 `__` 分隔，例如 `CHATROOM_JWT__SECRET`

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "CHATROOM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "chatroom.toml";
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// 全局应用配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// JWT认证配置
    pub jwt: JwtConfig,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitConfig,
    /// WebSocket 连接限制与心跳
    pub transport: TransportConfig,
    /// 并发额度与队列大小
    pub workers: WorkerConfig,
    pub history: HistoryConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS 允许的来源，`None` 表示任意来源
    pub allowed_origin: Option<String>,
    /// 部署在反向代理之后时才开启：匿名限流按 `X-Forwarded-For` 的首个地址计数
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origin: None,
            trust_forwarded_for: false,
        }
    }
}

/// JWT配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// 没有安全的默认值，必须通过配置文件或环境变量提供
    pub secret: String,
    pub expiration_hours: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expiration_hours: 24,
        }
    }
}

/// Redis配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// 在线状态共享频道
    pub presence_channel: String,
    /// 限流计数键前缀
    pub rate_limit_prefix: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            presence_channel: "presence-channel".to_string(),
            rate_limit_prefix: "rate_limit".to_string(),
            reconnect_interval_ms: 1000,
            max_reconnect_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub authenticated_per_minute: u64,
    pub anonymous_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            authenticated_per_minute: 100,
            anonymous_per_minute: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 单次写出的时间上限
    pub send_time_limit_secs: u64,
    /// 每个连接排队未发出的字节上限
    pub send_buffer_size_limit: usize,
    /// 单帧入站消息上限
    pub message_size_limit: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_workers: usize,
    /// 进程内广播通道容量
    pub broadcast_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_time_limit_secs: 20,
            send_buffer_size_limit: 512 * 1024,
            message_size_limit: 128 * 1024,
            heartbeat_interval_secs: 10,
            heartbeat_workers: 2,
            broadcast_capacity: 1024,
        }
    }
}

/// tokio 没有“核心线程数”的概念，并发上限用信号量表达，队列用有界通道表达。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 同时处理的入站帧上限
    pub inbound_max: usize,
    /// 每个连接等待处理的入站帧上限
    pub inbound_queue: usize,
    /// 同时写出的连接上限
    pub outbound_max: usize,
    pub persistence_workers: usize,
    pub persistence_queue: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inbound_max: 16,
            inbound_queue: 100,
            outbound_max: 16,
            persistence_workers: 2,
            persistence_queue: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub recent_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { recent_limit: 50 }
    }
}

impl AppConfig {
    /// 按默认顺序加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config: AppConfig = Self::figment(&path)
            .extract()
            .map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CHATROOM_").split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

        if self.jwt.secret.len() < MIN_JWT_SECRET_LEN {
            return invalid("jwt.secret must be at least 32 characters");
        }
        if self.jwt.expiration_hours <= 0 {
            return invalid("jwt.expiration_hours must be positive");
        }
        if self.rate_limit.authenticated_per_minute == 0 || self.rate_limit.anonymous_per_minute == 0
        {
            return invalid("rate limit ceilings must be positive");
        }
        if self.rate_limit.anonymous_per_minute > self.rate_limit.authenticated_per_minute {
            return invalid("anonymous ceiling cannot exceed authenticated ceiling");
        }

        let workers = &self.workers;
        if [
            workers.inbound_max,
            workers.inbound_queue,
            workers.outbound_max,
            workers.persistence_workers,
            workers.persistence_queue,
        ]
        .contains(&0)
        {
            return invalid("worker counts and queue sizes must be positive");
        }

        let transport = &self.transport;
        if transport.send_time_limit_secs == 0
            || transport.heartbeat_interval_secs == 0
            || transport.heartbeat_workers == 0
            || transport.send_buffer_size_limit == 0
            || transport.message_size_limit == 0
            || transport.broadcast_capacity == 0
        {
            return invalid("transport limits must be positive");
        }
        if self.history.recent_limit == 0 {
            return invalid("history.recent_limit must be positive");
        }
        if self.redis.presence_channel.is_empty() {
            return invalid("redis.presence_channel cannot be empty");
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
