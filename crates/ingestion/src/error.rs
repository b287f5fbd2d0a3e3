//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 监听端口绑定失败
    #[error("failed to bind trigger listener on {address}: {source}")]
    Bind {
        /// 监听地址
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// 源线程启动失败
    #[error("failed to spawn source '{name}': {source}")]
    SourceSpawn {
        /// 源名称
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
