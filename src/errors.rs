use std::fmt;

#[derive(Debug, Clone)]
pub enum AnalyzerError {
    CacheConnection(String),
    CacheOperation(String),
    GeoDatabase(String),
    GeoLookup(String),
    Blacklist(String),
    Config(String),
    FileOperation(String),
    Validation(String),
    Serialization(String),
    SignalOperation(String),
    NotifyServer(String),
}

impl AnalyzerError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            AnalyzerError::CacheConnection(_) => "E001",
            AnalyzerError::CacheOperation(_) => "E002",
            AnalyzerError::GeoDatabase(_) => "E003",
            AnalyzerError::GeoLookup(_) => "E004",
            AnalyzerError::Blacklist(_) => "E005",
            AnalyzerError::Config(_) => "E006",
            AnalyzerError::FileOperation(_) => "E007",
            AnalyzerError::Validation(_) => "E008",
            AnalyzerError::Serialization(_) => "E009",
            AnalyzerError::SignalOperation(_) => "E010",
            AnalyzerError::NotifyServer(_) => "E011",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            AnalyzerError::CacheConnection(_) => "Cache Connection Error",
            AnalyzerError::CacheOperation(_) => "Cache Operation Error",
            AnalyzerError::GeoDatabase(_) => "Geo Database Error",
            AnalyzerError::GeoLookup(_) => "Geo Lookup Error",
            AnalyzerError::Blacklist(_) => "Blacklist Error",
            AnalyzerError::Config(_) => "Configuration Error",
            AnalyzerError::FileOperation(_) => "File Operation Error",
            AnalyzerError::Validation(_) => "Validation Error",
            AnalyzerError::Serialization(_) => "Serialization Error",
            AnalyzerError::SignalOperation(_) => "Signal Operation Error",
            AnalyzerError::NotifyServer(_) => "Notify Server Error",
        }
    }

    /// 获取错误详情
    ///
    /// 对 `GeoLookup` 而言这就是返回给客户端的原始错误文本
    pub fn message(&self) -> &str {
        match self {
            AnalyzerError::CacheConnection(msg) => msg,
            AnalyzerError::CacheOperation(msg) => msg,
            AnalyzerError::GeoDatabase(msg) => msg,
            AnalyzerError::GeoLookup(msg) => msg,
            AnalyzerError::Blacklist(msg) => msg,
            AnalyzerError::Config(msg) => msg,
            AnalyzerError::FileOperation(msg) => msg,
            AnalyzerError::Validation(msg) => msg,
            AnalyzerError::Serialization(msg) => msg,
            AnalyzerError::SignalOperation(msg) => msg,
            AnalyzerError::NotifyServer(msg) => msg,
        }
    }

    /// 格式化为彩色输出（用于 supervisor 启动失败）
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于日志和 CLI）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for AnalyzerError {}

// 便捷的构造函数
impl AnalyzerError {
    pub fn cache_connection<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::CacheConnection(msg.into())
    }

    pub fn cache_operation<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::CacheOperation(msg.into())
    }

    pub fn geo_database<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::GeoDatabase(msg.into())
    }

    pub fn geo_lookup<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::GeoLookup(msg.into())
    }

    pub fn blacklist<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::Blacklist(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::Config(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::Validation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::Serialization(msg.into())
    }

    pub fn signal_operation<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::SignalOperation(msg.into())
    }

    pub fn notify_server<T: Into<String>>(msg: T) -> Self {
        AnalyzerError::NotifyServer(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<std::io::Error> for AnalyzerError {
    fn from(err: std::io::Error) -> Self {
        AnalyzerError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(err: serde_json::Error) -> Self {
        AnalyzerError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for AnalyzerError {
    fn from(err: redis::RedisError) -> Self {
        AnalyzerError::CacheOperation(err.to_string())
    }
}

impl From<maxminddb::MaxMindDbError> for AnalyzerError {
    fn from(err: maxminddb::MaxMindDbError) -> Self {
        AnalyzerError::GeoDatabase(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_raw_text() {
        let err = AnalyzerError::geo_lookup("The address 10.0.0.1 is not in the database.");
        assert_eq!(err.message(), "The address 10.0.0.1 is not in the database.");
        assert_eq!(err.code(), "E004");
        assert_eq!(
            err.to_string(),
            "Geo Lookup Error: The address 10.0.0.1 is not in the database."
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AnalyzerError = io.into();
        assert!(matches!(err, AnalyzerError::FileOperation(_)));
    }
}
