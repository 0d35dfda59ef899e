use tracing::debug;

use crate::engine::EngineConnection;
use crate::session::SessionHandle;

use super::{HandshakeOutcome, absorb_or_abort, harvest, inject, validate_chunk};

/// 推进 TLS 客户端握手一步，并按调用方容量收割出站字节。
///
/// # 逻辑（How）
/// 1. 读取出站待发字节数；
/// 2. 若为 0：
///    - 无输入分片：首次调用，标记客户端发起方并推进一步（通常产出 ClientHello）；
///    - 有输入分片：整段写入入站队列后推进一步；
/// 3. 推进失败时按处置方式分类：协议错误、传输错误、握手期间有序关闭为致命，
///    记录引擎错误队列后返回 `HandshakeAborted`；其余视为“本轮没有更多输出”；
/// 4. 收割：待发字节大于容量返回 `NeedsLargerBuffer`，否则整批复制。
///
/// # 契约（What）
/// - 出站队列仍有未取走字节时跳过第 2 步，因此以相同输入、更大缓冲重试不会重复注入分片，
///   也不会再次推进引擎；
/// - 参数非法时没有任何副作用。
pub fn step<C: EngineConnection>(
    session: &mut SessionHandle<C>,
    chunk: Option<&[u8]>,
    out: &mut [u8],
) -> HandshakeOutcome {
    let chunk = validate_chunk(chunk)?;
    let (connection, channels) = session.parts_mut();

    let pending = channels.outbound().pending();
    if pending == 0 {
        let advanced = match chunk {
            None => {
                debug!("initiating client handshake step");
                connection.set_client_mode();
                connection.advance_handshake(channels)
            }
            Some(bytes) => {
                inject(channels.inbound_mut(), bytes)?;
                debug!(chunk_len = bytes.len(), "handshake step with peer data");
                connection.advance_handshake(channels)
            }
        };
        if let Err(err) = advanced {
            absorb_or_abort(connection, err)?;
        }
    } else {
        debug!(pending, "outbound not drained, engine step skipped");
    }

    Ok(harvest(channels.outbound_mut(), out))
}
