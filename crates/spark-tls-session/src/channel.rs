use std::io;

use bytes::{Buf, BytesMut};

/// 单向内存字节队列，替代套接字的一个收发方向。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 会话核心不持有真实连接：入站密文由调用方写入，出站密文由调用方取走，
///   队列即是 TLS 引擎唯一可见的“网络”；
/// - 底层存储复用 `bytes::BytesMut`，尾部追加、头部 `advance`，避免整体搬移。
///
/// ## 契约（What）
/// - 严格 FIFO：只在尾部追加、只从头部消费；
/// - `pending()` 永远等于尚未消费的真实字节数；
/// - `total_appended`/`total_consumed` 单调递增，供测试与诊断核对“注入次数”；
/// - 设置 `limit` 后，`write` 仅接受不超过剩余额度的字节，返回值为实际接受量。
///
/// ## 风险与权衡（Trade-offs）
/// - 默认无上限，出站批次大小完全由引擎决定；若调用方长期不取走出站数据，
///   内存会随之增长，因此驱动层在存在未取走数据时拒绝再次推进引擎。
#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: BytesMut,
    limit: Option<usize>,
    total_appended: u64,
    total_consumed: u64,
}

/// 队列统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub total_appended: u64,
    pub total_consumed: u64,
}

impl ByteQueue {
    /// 创建无上限队列。
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带可选容量上限的队列，`None` 表示无上限。
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// 尚未消费的字节数。
    #[inline]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.buf.len(),
            total_appended: self.total_appended,
            total_consumed: self.total_consumed,
        }
    }

    /// 在尾部追加字节，返回实际接受的字节数。
    ///
    /// - 无上限时总是全部接受；
    /// - 有上限时只接受剩余额度以内的前缀，调用方需自行比较返回值与输入长度。
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let accepted = match self.limit {
            Some(limit) => bytes.len().min(limit.saturating_sub(self.buf.len())),
            None => bytes.len(),
        };
        self.buf.extend_from_slice(&bytes[..accepted]);
        self.total_appended += accepted as u64;
        accepted
    }

    /// 从头部消费至多 `out.len()` 字节，返回实际复制的字节数。
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        self.total_consumed += n as u64;
        n
    }
}

/// 引擎通过 `io::Read` 拉取入站密文；队列为空时返回 `WouldBlock` 而不是 EOF，
/// 以便非阻塞引擎把“暂无数据”理解为“稍后重试”。
impl io::Read for ByteQueue {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(ByteQueue::read(self, out))
    }
}

impl io::Write for ByteQueue {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let accepted = ByteQueue::write(self, bytes);
        if accepted == 0 && !bytes.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 入站/出站队列对。
///
/// - `inbound`：来自对端、等待引擎消费的密文；
/// - `outbound`：引擎产出、等待调用方发送给对端的密文。
///
/// 两个方向互不影响；队列对在会话创建时绑定到引擎连接，此后不再更换。
#[derive(Debug, Default)]
pub struct ByteChannelPair {
    inbound: ByteQueue,
    outbound: ByteQueue,
}

impl ByteChannelPair {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为入站方向设置容量上限；出站方向始终无上限。
    pub fn with_inbound_limit(limit: Option<usize>) -> Self {
        Self {
            inbound: ByteQueue::with_limit(limit),
            outbound: ByteQueue::new(),
        }
    }

    pub fn inbound(&self) -> &ByteQueue {
        &self.inbound
    }

    pub fn outbound(&self) -> &ByteQueue {
        &self.outbound
    }

    pub fn inbound_mut(&mut self) -> &mut ByteQueue {
        &mut self.inbound
    }

    pub fn outbound_mut(&mut self) -> &mut ByteQueue {
        &mut self.outbound
    }

    /// 同时借出两个方向，供引擎在一次动作中既读入站又写出站。
    pub fn split_mut(&mut self) -> (&mut ByteQueue, &mut ByteQueue) {
        (&mut self.inbound, &mut self.outbound)
    }
}
