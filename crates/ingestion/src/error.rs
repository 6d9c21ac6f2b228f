//! Ingestion 错误类型

use contracts::SessionId;
use frame_engine::EngineError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 监听地址绑定失败
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 连接设备失败
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 打开回放文件失败
    #[error("failed to open capture {path}: {source}")]
    OpenCapture {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 解码器配置无效
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// 下游事件通道已关闭
    #[error("event channel closed for session {session_id}")]
    ChannelClosed { session_id: SessionId },
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
