use std::cell::Cell;
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::channel::ByteChannelPair;
use crate::driver::{self, HandshakeOutcome};
use crate::engine::{EngineConnection, RustlsConnection, SessionInfo, TlsEngine};
use crate::error::EngineError;
use crate::plaintext;

/// 会话句柄：独占一个引擎连接及其绑定的入站/出站队列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 没有套接字的 TLS 会话：对端字节由调用方经入站队列送入，引擎产出的记录经出站队列取走，
///   “等待网络”完全交给调用方调度；
/// - 句柄是唯一的所有者，销毁句柄即释放连接与两个队列，不存在隐式回收。
///
/// ## 契约（What）
/// - 创建成功后连接对象在句柄整个生命周期内有效，队列对只在创建时绑定一次；
/// - 同一句柄上的所有操作必须串行：句柄是 `Send` 但不是 `Sync`，可以移交给另一线程，
///   不能被多个线程同时借用；
/// - 内部没有锁，也没有取消与超时；需要握手超时的调用方应停止驱动并销毁句柄。
///
/// ## 风险与权衡（Trade-offs）
/// - 出站队列不设上限，驱动层通过“未取走就不再推进引擎”的背压规则约束其增长。
#[derive(Debug)]
pub struct SessionHandle<C: EngineConnection> {
    connection: C,
    channels: ByteChannelPair,
    _not_sync: PhantomData<Cell<()>>,
}

/// 以 `rustls` 为引擎的会话。
pub type RustlsSession = SessionHandle<RustlsConnection>;

impl<C: EngineConnection> SessionHandle<C> {
    /// 基于已配置的协议上下文创建会话。
    ///
    /// 连接创建失败时不会留下任何部分状态。
    pub fn create<E>(engine: &E) -> Result<Self, EngineError>
    where
        E: TlsEngine<Connection = C>,
    {
        let connection = engine.new_connection()?;
        let channels = ByteChannelPair::with_inbound_limit(engine.inbound_limit());
        debug!(
            inbound_limit = ?engine.inbound_limit(),
            "tls session created"
        );
        Ok(Self {
            connection,
            channels,
            _not_sync: PhantomData,
        })
    }

    /// 显式销毁会话，释放连接与队列。
    pub fn destroy(self) {
        let stats = (self.channels.inbound().stats(), self.channels.outbound().stats());
        debug!(inbound = ?stats.0, outbound = ?stats.1, "tls session destroyed");
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn channels(&self) -> &ByteChannelPair {
        &self.channels
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut C, &mut ByteChannelPair) {
        (&mut self.connection, &mut self.channels)
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.connection.is_handshake_complete()
    }

    pub fn session_info(&self) -> SessionInfo {
        self.connection.session_info()
    }

    /// 把对端密文直接追加到入站队列，返回实际接受的字节数。
    pub fn traffic_in(&mut self, chunk: &[u8]) -> usize {
        let accepted = self.channels.inbound_mut().write(chunk);
        trace!(offered = chunk.len(), accepted, "traffic in");
        accepted
    }

    /// 从出站队列取走至多 `buf.len()` 字节密文。
    pub fn traffic_out(&mut self, buf: &mut [u8]) -> usize {
        let drained = self.channels.outbound_mut().read(buf);
        trace!(capacity = buf.len(), drained, "traffic out");
        drained
    }

    /// 见 [`driver::handshake::step`]。
    pub fn step(&mut self, chunk: Option<&[u8]>, out: &mut [u8]) -> HandshakeOutcome {
        driver::handshake::step(self, chunk, out)
    }

    /// 见 [`driver::alert::process_alert`]。
    pub fn process_alert(&mut self, chunk: Option<&[u8]>, out: &mut [u8]) -> HandshakeOutcome {
        driver::alert::process_alert(self, chunk, out)
    }

    /// 见 [`driver::close_notify::build_close_notify`]。
    pub fn build_close_notify(&mut self, out: &mut [u8]) -> HandshakeOutcome {
        driver::close_notify::build_close_notify(self, out)
    }

    /// 见 [`plaintext::read`]。
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, EngineError> {
        plaintext::read(self, buf)
    }

    /// 见 [`plaintext::write`]。
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, EngineError> {
        plaintext::write(self, buf)
    }
}
