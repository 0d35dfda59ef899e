#![doc = r#"
# spark-tls-session

## 设计动机（Why）
- **无套接字的 TLS**：在固件或自带网络栈的环境中，TLS 引擎无法直接读写连接；本 crate 用一对内存队列
  （入站 / 出站）替代套接字，由调用方在网络与队列之间搬运密文；
- **确定的缓冲协商**：每次驱动调用要么交出一整批出站字节，要么报告所需的精确大小，调用方换缓冲重试
  不会重复推进引擎；
- **清晰的错误分类**：引擎错误在单一位置翻译为“致命 / 瞬时”，调用方只看到参数非法、缓冲不足、
  握手中止与 I/O 不足四种结果。

## 核心契约（What）
- [`initialize`]：进程级一次性初始化，返回构建引擎上下文所需的 [`LibraryToken`]；
- [`RustlsEngine`]：按 [`TlsClientSettings`] 组装的协议上下文，实现 [`TlsEngine`]；
- [`SessionHandle`]：独占一个引擎连接与其 [`ByteChannelPair`]；
- 驱动：[`driver::handshake::step`]、[`driver::alert::process_alert`]、
  [`driver::close_notify::build_close_notify`]，以及 [`plaintext`] 中的明文读写；
- [`ffi`]：供固件宿主调用的 C ABI。

## 实现策略（How）
- 引擎默认为 `rustls`（ring 提供密码学实现），适配层在每个动作中先拉取入站密文、再推出全部待发记录；
- 队列基于 `bytes::BytesMut`，诊断经 `tracing` 输出，错误类型由 `thiserror` 派生。

## 风险与考量（Trade-offs）
- 只支持客户端角色；
- 会话句柄不是线程安全的调用目标，同一句柄上的操作必须串行；
- 没有内置超时，需要超时的调用方应停止驱动并销毁句柄。
"#]

pub mod certs;
pub mod channel;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod init;
pub mod plaintext;
pub mod session;

#[cfg(test)]
mod test_stubs;

pub use certs::{ClientIdentity, TrustStore};
pub use channel::{ByteChannelPair, ByteQueue, QueueStats};
pub use config::{TlsClientSettings, TlsVersion, VerifyMode};
pub use driver::{HandshakeOutcome, Harvest};
pub use engine::{
    Disposition, EngineConnection, RustlsConnection, RustlsEngine, SessionInfo, TlsEngine,
    classify_engine_error,
};
pub use error::{ConfigError, DriverError, EngineError, EngineErrorKind};
pub use init::{LibraryToken, initialize};
pub use session::{RustlsSession, SessionHandle};

#[allow(dead_code)]
fn _assert_session_is_send()
where
    RustlsSession: Send,
{
}
