use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::services::CredentialVerifier;

/// 缓存淘汰模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExpireMode {
    /// 每个结果带过期时间
    #[default]
    Ttl,
    /// 固定条数，按插入顺序淘汰最旧的
    Bounded,
}

impl std::fmt::Display for ExpireMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// 服务配置（从 TOML + 环境变量加载）
///
/// - server: 监听地址、worker 数量、回收策略
/// - auth: 请求认证
/// - redis: 共享缓存 / 计数后端
/// - cache: 结果缓存策略
/// - mmdb: GeoIP 数据库
/// - blacklist: IPsum 黑名单
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub mmdb: MmdbConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > 配置文件 > 默认值
    /// ENV 前缀：IPA，分隔符：__
    /// 示例：IPA__SERVER__PORT=3001
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        use config::{Config, Environment, File};

        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("IPA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize::<AppConfig>()
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 是否只运行一个 worker（本地计数器仅在此时有效）
    pub fn is_single_worker(&self) -> bool {
        self.server.workers == 1
    }

    /// 监听地址
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 常驻内存上限（MB，包含已加载的 GeoIP 数据库），超过且无活动连接时回收 worker，0 表示不检查
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    /// 处理多少请求后回收 worker，0 表示不限制
    #[serde(default)]
    pub max_requests: u64,
    /// 定时重启（cron 表达式），空字符串表示不启用
    #[serde(default)]
    pub restart_cron: String,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// 请求认证配置
///
/// 密码哈希只保存在本结构体内部，外部只能通过 [`AuthConfig::authenticate`] 校验。
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    hash: Option<String>,
}

impl AuthConfig {
    pub fn new(enabled: bool, hash: Option<String>) -> Self {
        Self { enabled, hash }
    }

    /// 是否配置了密码哈希
    pub fn has_credential(&self) -> bool {
        self.hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// 使用给定的校验器验证客户端提交的密码
    pub fn authenticate(&self, verifier: &dyn CredentialVerifier, secret: &str) -> bool {
        if secret.is_empty() {
            return false;
        }
        match self.hash.as_deref() {
            Some(hash) if !hash.is_empty() => verifier.verify(secret, hash),
            _ => false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("enabled", &self.enabled)
            .field("hash", &self.hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
    /// 启动时（worker 0）是否将统计计数清零
    #[serde(default = "default_true")]
    pub reset_stats_on_start: bool,
}

/// 结果缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub expire_mode: ExpireMode,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub reset_ttl_on_get: bool,
    #[serde(default = "default_cache_max_items")]
    pub max_items: usize,
}

/// GeoIP 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmdbConfig {
    #[serde(default = "default_mmdb_path")]
    pub path: String,
    #[serde(default)]
    pub fallback_path: String,
    #[serde(default)]
    pub reload_cron: String,
}

/// IPsum 黑名单配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_blacklist_url")]
    pub url: String,
    #[serde(default = "default_blacklist_path")]
    pub path: String,
    #[serde(default = "default_blacklist_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_blacklist_min_level")]
    pub min_level: u32,
    #[serde(default = "default_blacklist_update_cron")]
    pub update_cron: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_workers() -> usize {
    1
}

fn default_max_memory_mb() -> u64 {
    256
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_redis_key_prefix() -> String {
    "IP_ANALYZER:".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_max_items() -> usize {
    100
}

fn default_mmdb_path() -> String {
    "/usr/share/GeoIP/GeoLite2-City.mmdb".to_string()
}

fn default_blacklist_url() -> String {
    "https://raw.githubusercontent.com/stamparm/ipsum/master/ipsum.txt".to_string()
}

fn default_blacklist_path() -> String {
    "blacklist/ipsum.txt".to_string()
}

fn default_blacklist_max_lines() -> usize {
    100_000
}

fn default_blacklist_min_level() -> u32 {
    2
}

fn default_blacklist_update_cron() -> String {
    "15 1 * * *".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            workers: default_workers(),
            max_memory_mb: default_max_memory_mb(),
            max_requests: 0,
            restart_cron: String::new(),
            read_timeout_secs: default_read_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            key_prefix: default_redis_key_prefix(),
            reset_stats_on_start: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            expire_mode: ExpireMode::default(),
            ttl_secs: default_cache_ttl(),
            reset_ttl_on_get: false,
            max_items: default_cache_max_items(),
        }
    }
}

impl Default for MmdbConfig {
    fn default() -> Self {
        Self {
            path: default_mmdb_path(),
            fallback_path: String::new(),
            reload_cron: String::new(),
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_blacklist_url(),
            path: default_blacklist_path(),
            max_lines: default_blacklist_max_lines(),
            min_level: default_blacklist_min_level(),
            update_cron: default_blacklist_update_cron(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: true,
        }
    }
}
