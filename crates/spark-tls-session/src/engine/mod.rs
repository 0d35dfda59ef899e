//! TLS 引擎能力接口。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 会话核心只驱动引擎，不实现记录层、密钥推导与加解密；引擎以两个 trait 的形式出现，
//!   核心从不窥探其内部状态；
//! - 引擎特有的错误码只在 [`classify_engine_error`] 一处翻译为“致命 / 瞬时”，驱动层据此决策。
//!
//! ## 契约（What）
//! - [`TlsEngine`]：已配置的协议上下文（版本范围、校验模式、信任库均已设置），
//!   负责创建绑定到该上下文的连接对象；
//! - [`EngineConnection`]：单个连接。所有涉及传输的操作都接收会话的 [`ByteChannelPair`]，
//!   该队列对是连接唯一的 I/O 通道；从空的入站队列读取得到“重试”而不是阻塞；
//! - 连接对象不是线程安全的调用目标：同一连接上的操作必须由调用方串行发起。

mod rustls_engine;

pub use self::rustls_engine::{RustlsConnection, RustlsEngine};

use crate::channel::ByteChannelPair;
use crate::error::{EngineError, EngineErrorKind};

/// 引擎错误对单次驱动调用的处置方式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// 会话不可恢复，驱动调用以 `HandshakeAborted` 结束。
    Fatal,
    /// 在内存缓冲驱动模型中等价于“本轮无更多输出”，驱动继续收割出站数据。
    Transient,
}

/// 将引擎原始错误种类翻译为处置方式。
///
/// 致命集合恰为协议错误、传输错误与握手期间的有序关闭；其余（`WantRead`/`WantWrite`
/// 等）在非阻塞握手中属于预期情况。
pub fn classify_engine_error(kind: EngineErrorKind) -> Disposition {
    match kind {
        EngineErrorKind::Protocol | EngineErrorKind::Transport | EngineErrorKind::ZeroReturn => {
            Disposition::Fatal
        }
        EngineErrorKind::WantRead | EngineErrorKind::WantWrite | EngineErrorKind::Other => {
            Disposition::Transient
        }
    }
}

/// 连接元数据快照。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// 协商出的协议版本线上编码（如 `0x0304` 表示 TLS 1.3）。
    pub protocol_version: Option<u16>,
    /// 协商出的密码套件 IANA 编号。
    pub cipher_suite: Option<u16>,
    pub alpn_protocol: Option<Vec<u8>>,
    /// 客户端发出的 SNI 主机名。
    pub server_name: Option<String>,
    /// 对端证书链（DER），叶子证书在前。
    pub peer_certificates: Vec<Vec<u8>>,
    pub handshake_complete: bool,
}

/// 已配置的协议上下文。
pub trait TlsEngine {
    type Connection: EngineConnection;

    /// 创建绑定到本上下文的新连接。
    fn new_connection(&self) -> Result<Self::Connection, EngineError>;

    /// 入站队列容量上限，`None` 表示无上限。
    fn inbound_limit(&self) -> Option<usize> {
        None
    }
}

/// 单个引擎连接的能力集合。
pub trait EngineConnection {
    /// 将连接标记为客户端发起方。
    fn set_client_mode(&mut self);

    /// 在不等待新输入的前提下尽可能推进握手状态机一步。
    ///
    /// 返回 `Err` 时引擎可能已经把待发送的记录（例如致命告警）写入出站队列。
    fn advance_handshake(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError>;

    fn is_handshake_complete(&self) -> bool;

    /// 触发优雅关闭：向出站队列排入 close_notify，重复调用不会产生第二条告警。
    fn shutdown(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError>;

    /// 读取已解密的应用数据。
    fn read_plaintext(
        &mut self,
        io: &mut ByteChannelPair,
        buf: &mut [u8],
    ) -> Result<usize, EngineError>;

    /// 写入应用数据，加密后的记录进入出站队列。
    fn write_plaintext(&mut self, io: &mut ByteChannelPair, buf: &[u8])
    -> Result<usize, EngineError>;

    fn session_info(&self) -> SessionInfo;

    /// 取走引擎内部累积的诊断信息（错误队列），取走后队列清空。
    fn drain_diagnostics(&mut self) -> Vec<String>;
}
