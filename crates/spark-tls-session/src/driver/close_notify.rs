use tracing::{debug, warn};

use crate::engine::EngineConnection;
use crate::session::SessionHandle;

use super::{HandshakeOutcome, harvest};

/// 生成 close_notify 告警并收割。
///
/// 出站为空时触发引擎的优雅关闭原语；关闭只会发出一次，之后再调用只收割（通常为 0 字节）。
/// 不接受输入，也从不消费入站队列。
pub fn build_close_notify<C: EngineConnection>(
    session: &mut SessionHandle<C>,
    out: &mut [u8],
) -> HandshakeOutcome {
    let (connection, channels) = session.parts_mut();

    if channels.outbound().is_empty() {
        match connection.shutdown(channels) {
            Ok(()) => debug!(pending = channels.outbound().pending(), "close_notify queued"),
            Err(err) => warn!(error = %err, "engine shutdown reported an error"),
        }
    }

    Ok(harvest(channels.outbound_mut(), out))
}
