use tracing::{debug, trace};

use crate::engine::EngineConnection;
use crate::session::SessionHandle;

use super::{HandshakeOutcome, harvest, inject, validate_chunk};

/// 单条 TLS 记录明文的最大长度上限（含扩展余量），告警处理用作一次性读取的暂存区。
pub const ALERT_SCRATCH_LEN: usize = 32 * 1024;

/// 处理收到的告警记录，并收割引擎因此排入出站队列的响应。
///
/// # 教案级注释
///
/// ## 逻辑（How）
/// - 出站为空且提供了分片：注入入站队列，随后以 [`ALERT_SCRATCH_LEN`] 大小的暂存区读取一次明文
///   并丢弃结果。读取只为迫使引擎处理缓冲中的告警记录，并把其响应（如对端致命告警后的应答）排入出站；
/// - 未提供分片：不注入、不读取，直接收割已有的待发字节；
/// - 收割规则与握手驱动一致。
///
/// ## 契约（What）
/// - 入站队列接受量少于分片长度时返回 `DriverError::Io`；
/// - 读取结果（包括引擎错误）不参与分类；
/// - 只做一次尽力读取，不循环：单次读取未能消化的后续记录留在引擎内，由后续调用处理。
pub fn process_alert<C: EngineConnection>(
    session: &mut SessionHandle<C>,
    chunk: Option<&[u8]>,
    out: &mut [u8],
) -> HandshakeOutcome {
    let chunk = validate_chunk(chunk)?;
    let (connection, channels) = session.parts_mut();

    if channels.outbound().is_empty() {
        if let Some(bytes) = chunk {
            inject(channels.inbound_mut(), bytes)?;
            let mut scratch = vec![0u8; ALERT_SCRATCH_LEN];
            match connection.read_plaintext(channels, &mut scratch) {
                Ok(n) => trace!(discarded = n, "alert read drained plaintext"),
                Err(err) => trace!(error = %err, "alert read finished"),
            }
            debug!(chunk_len = bytes.len(), "alert record processed");
        }
    }

    Ok(harvest(channels.outbound_mut(), out))
}
