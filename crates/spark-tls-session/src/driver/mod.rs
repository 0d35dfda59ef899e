//! 驱动层：在会话句柄上执行“一次推进 + 一次收割”。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 没有套接字，驱动就不能“等数据”：每次调用只做一个单位的前进（注入一段密文并推进一步，
//!   或者首次引导），随后立即返回，让调用方与真实网络交换字节；
//! - 四个驱动（握手、告警、关闭通知，以及明文读写）共享同一套出站收割与参数校验逻辑，
//!   集中在本模块。
//!
//! ## 契约（What）
//! - 输入分片以 `Option<&[u8]>` 表达：`None` 表示无输入，`Some` 必须非空；
//! - 输出容量即 `out.len()`；出站待发字节数大于容量时返回
//!   [`Harvest::NeedsLargerBuffer`]，且不消费出站队列，调用方换更大的缓冲重试即可；
//! - 出站队列中仍有未取走的字节时，驱动不会再次进入引擎。

pub mod alert;
pub mod close_notify;
pub mod handshake;

use tracing::{debug, trace, warn};

use crate::channel::ByteQueue;
use crate::engine::{Disposition, EngineConnection, classify_engine_error};
use crate::error::{DriverError, EngineError};

/// 一次收割的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Harvest {
    /// 已把 `n` 字节出站密文复制到调用方缓冲的前缀，`n` 可以为 0。
    Produced(usize),
    /// 调用方缓冲过小；`required` 恰为当前待发字节数。
    NeedsLargerBuffer { required: usize },
}

/// 驱动调用的结果：成功收割、需要更大缓冲，或 [`DriverError`]。
pub type HandshakeOutcome = Result<Harvest, DriverError>;

/// 校验输入分片的指针/长度配对。
pub(crate) fn validate_chunk(chunk: Option<&[u8]>) -> Result<Option<&[u8]>, DriverError> {
    match chunk {
        Some(bytes) if bytes.is_empty() => {
            Err(DriverError::invalid("input chunk is present but empty"))
        }
        other => Ok(other),
    }
}

/// 把整段分片写入入站队列；接受量不足即视为 I/O 失败。
pub(crate) fn inject(inbound: &mut ByteQueue, chunk: &[u8]) -> Result<(), DriverError> {
    let accepted = inbound.write(chunk);
    if accepted != chunk.len() {
        warn!(expected = chunk.len(), accepted, "inbound queue rejected part of the chunk");
        return Err(DriverError::Io {
            expected: chunk.len(),
            accepted,
        });
    }
    trace!(chunk_len = chunk.len(), "chunk injected into inbound queue");
    Ok(())
}

/// 比较待发字节与调用方容量，要么报告所需大小，要么整批复制出去。
pub(crate) fn harvest(outbound: &mut ByteQueue, out: &mut [u8]) -> Harvest {
    let pending = outbound.pending();
    if pending > out.len() {
        debug!(pending, capacity = out.len(), "output buffer too small");
        return Harvest::NeedsLargerBuffer { required: pending };
    }
    if pending == 0 {
        return Harvest::Produced(0);
    }
    let copied = outbound.read(&mut out[..pending]);
    debug!(bytes = copied, "outbound batch harvested");
    Harvest::Produced(copied)
}

/// 按处置方式吸收瞬时错误，或在致命错误时输出引擎错误队列并中止。
pub(crate) fn absorb_or_abort<C: EngineConnection>(
    connection: &mut C,
    err: EngineError,
) -> Result<(), DriverError> {
    match classify_engine_error(err.kind) {
        Disposition::Transient => {
            trace!(kind = %err.kind, "transient engine condition absorbed");
            Ok(())
        }
        Disposition::Fatal => {
            for line in connection.drain_diagnostics() {
                warn!(code = err.code(), diagnostic = %line, "tls engine error queue");
            }
            let err = DriverError::HandshakeAborted { source: err };
            warn!(code = err.code(), error = %err, "tls handshake aborted");
            Err(err)
        }
    }
}
