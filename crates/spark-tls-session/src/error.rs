//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义会话核心对外暴露的三类错误：驱动层 [`DriverError`]、引擎边界 [`EngineError`]、
//!   配置装载 [`ConfigError`]；
//! - 每个错误都带稳定错误码（`code()`），便于运维脚本与 FFI 状态码按码归类，而无需解析文案。
//!
//! ## 设计要求（What）
//! - 驱动层只暴露粗粒度分类：参数非法、握手中止、底层写入不足；
//! - 引擎细节（原始错误种类、诊断文本）仅经由 [`EngineError`] 携带，不再向上细分。

use std::fmt;

use thiserror::Error;

/// 稳定错误码。
pub mod codes {
    pub const INVALID_ARGUMENT: &str = "spark.tls.session.invalid_argument";
    pub const HANDSHAKE_ABORTED: &str = "spark.tls.session.handshake_aborted";
    pub const IO_SHORT_WRITE: &str = "spark.tls.session.io_short_write";
    pub const ENGINE: &str = "spark.tls.engine.failure";
    pub const CONFIG: &str = "spark.tls.config.rejected";
}

/// 引擎上报的原始错误种类。
///
/// 与具体引擎无关的封闭枚举；由 [`crate::engine::classify_engine_error`] 统一翻译为
/// 致命/瞬时两类，驱动层不直接匹配这些变体。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// 需要更多入站数据才能继续。
    WantRead,
    /// 需要出站方向腾出空间才能继续。
    WantWrite,
    /// 协议层失败：报文非法、收到致命告警、证书校验失败等。
    Protocol,
    /// 经由引擎暴露的底层传输失败。
    Transport,
    /// 对端已有序关闭（close_notify）。
    ZeroReturn,
    Other,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineErrorKind::WantRead => "want read",
            EngineErrorKind::WantWrite => "want write",
            EngineErrorKind::Protocol => "protocol error",
            EngineErrorKind::Transport => "transport error",
            EngineErrorKind::ZeroReturn => "orderly closure",
            EngineErrorKind::Other => "other engine error",
        })
    }
}

/// 引擎边界错误：原始种类 + 引擎给出的可读描述。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn want_read() -> Self {
        Self::new(EngineErrorKind::WantRead, "no complete record available")
    }

    pub fn code(&self) -> &'static str {
        codes::ENGINE
    }
}

/// 驱动层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方每次调用只会看到“成功 / 需要更大缓冲 / 下列错误之一”，
///   其中“需要更大缓冲”属于正常协商信号，不在此枚举中；
/// - **契约 (What)**：
///   - `InvalidArgument`：在任何副作用之前检出，修正参数后可安全重试；
///   - `HandshakeAborted`：会话不可恢复，调用方需销毁并新建会话；
///   - `Io`：入站队列接受的字节少于提交量，本次调用失败。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    #[error("tls handshake aborted: {source}")]
    HandshakeAborted { source: EngineError },

    #[error("inbound queue accepted {accepted} of {expected} bytes")]
    Io { expected: usize, accepted: usize },
}

impl DriverError {
    pub(crate) fn invalid(reason: &'static str) -> Self {
        DriverError::InvalidArgument { reason }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DriverError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            DriverError::HandshakeAborted { .. } => codes::HANDSHAKE_ABORTED,
            DriverError::Io { .. } => codes::IO_SHORT_WRITE,
        }
    }
}

/// 配置、证书与密钥装载阶段的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown cipher suite `{0}`")]
    UnknownCipherSuite(String),

    #[error("unknown key exchange group `{0}`")]
    UnknownKxGroup(String),

    #[error("unsupported protocol version `{0}`")]
    UnsupportedVersion(String),

    #[error("protocol version range is empty: min {min} > max {max}")]
    VersionRange { min: String, max: String },

    #[error("invalid server name `{0}`")]
    InvalidServerName(String),

    #[error("peer verification requested but the trust store is empty")]
    EmptyTrustStore,

    #[error("certificate rejected: {reason}")]
    Certificate { reason: String },

    #[error("private key rejected: {reason}")]
    PrivateKey { reason: String },

    #[error("settings text is not valid UTF-8")]
    SettingsEncoding,

    #[error("settings parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("engine rejected configuration: {0}")]
    Engine(#[from] rustls::Error),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        codes::CONFIG
    }
}
