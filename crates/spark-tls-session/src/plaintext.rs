//! 握手完成后的应用数据读写。
//!
//! 直接透传给引擎：失败时返回引擎自身的错误（需要更多数据 / 致命），本层不再分类，
//! 语义与非阻塞流的 read/write 一致。

use crate::engine::EngineConnection;
use crate::error::EngineError;
use crate::session::SessionHandle;

/// 读取已解密的应用数据；会先消化入站队列中已到达的密文。
pub fn read<C: EngineConnection>(
    session: &mut SessionHandle<C>,
    buf: &mut [u8],
) -> Result<usize, EngineError> {
    let (connection, channels) = session.parts_mut();
    connection.read_plaintext(channels, buf)
}

/// 写入应用数据；加密后的记录进入出站队列，由调用方经 `traffic_out` 取走。
pub fn write<C: EngineConnection>(
    session: &mut SessionHandle<C>,
    buf: &[u8],
) -> Result<usize, EngineError> {
    let (connection, channels) = session.parts_mut();
    connection.write_plaintext(channels, buf)
}
