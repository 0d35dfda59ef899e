//! 单元测试用的脚本化引擎。
//!
//! 每次推进或读取都按顺序弹出一条脚本：先吃掉入站队列中的全部字节，再把脚本里的字节写入
//! 出站队列，最后按脚本返回成功或指定错误。调用计数暴露为公开字段，便于断言“引擎是否被再次进入”。

use std::collections::VecDeque;

use crate::channel::ByteChannelPair;
use crate::engine::{EngineConnection, SessionInfo, TlsEngine};
use crate::error::{EngineError, EngineErrorKind};

pub(crate) const SCRIPTED_CLOSE_NOTIFY: &[u8] = b"close-notify";

#[derive(Clone, Debug)]
pub(crate) struct StepScript {
    emit: Vec<u8>,
    fail: Option<EngineErrorKind>,
}

impl StepScript {
    pub(crate) fn emit(bytes: &[u8]) -> Self {
        Self {
            emit: bytes.to_vec(),
            fail: None,
        }
    }

    pub(crate) fn failing(mut self, kind: EngineErrorKind) -> Self {
        self.fail = Some(kind);
        self
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedEngine {
    script: Vec<StepScript>,
    inbound_limit: Option<usize>,
}

impl ScriptedEngine {
    pub(crate) fn new(script: Vec<StepScript>) -> Self {
        Self {
            script,
            inbound_limit: None,
        }
    }

    pub(crate) fn with_inbound_limit(mut self, limit: usize) -> Self {
        self.inbound_limit = Some(limit);
        self
    }
}

impl TlsEngine for ScriptedEngine {
    type Connection = ScriptedConnection;

    fn new_connection(&self) -> Result<ScriptedConnection, EngineError> {
        Ok(ScriptedConnection {
            script: self.script.iter().cloned().collect(),
            client_mode: false,
            steps: 0,
            reads: 0,
            last_read_capacity: 0,
            consumed: Vec::new(),
            close_sent: false,
            diagnostics: Vec::new(),
        })
    }

    fn inbound_limit(&self) -> Option<usize> {
        self.inbound_limit
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedConnection {
    script: VecDeque<StepScript>,
    pub(crate) client_mode: bool,
    pub(crate) steps: usize,
    pub(crate) reads: usize,
    pub(crate) last_read_capacity: usize,
    pub(crate) consumed: Vec<u8>,
    close_sent: bool,
    diagnostics: Vec<String>,
}

impl ScriptedConnection {
    fn run_next(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        let (inbound, outbound) = io.split_mut();
        let mut scratch = vec![0u8; inbound.pending()];
        inbound.read(&mut scratch);
        self.consumed.extend_from_slice(&scratch);

        let Some(script) = self.script.pop_front() else {
            return Err(EngineError::want_read());
        };
        outbound.write(&script.emit);
        match script.fail {
            Some(kind) => {
                let err = EngineError::new(kind, "scripted failure");
                self.diagnostics.push(err.to_string());
                Err(err)
            }
            None => Ok(()),
        }
    }
}

impl EngineConnection for ScriptedConnection {
    fn set_client_mode(&mut self) {
        self.client_mode = true;
    }

    fn advance_handshake(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        self.steps += 1;
        self.run_next(io)
    }

    fn is_handshake_complete(&self) -> bool {
        self.steps > 0 && self.script.is_empty()
    }

    fn shutdown(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        if !self.close_sent {
            io.outbound_mut().write(SCRIPTED_CLOSE_NOTIFY);
            self.close_sent = true;
        }
        Ok(())
    }

    fn read_plaintext(
        &mut self,
        io: &mut ByteChannelPair,
        buf: &mut [u8],
    ) -> Result<usize, EngineError> {
        self.reads += 1;
        self.last_read_capacity = buf.len();
        self.run_next(io).map(|()| 0)
    }

    fn write_plaintext(
        &mut self,
        io: &mut ByteChannelPair,
        buf: &[u8],
    ) -> Result<usize, EngineError> {
        Ok(io.outbound_mut().write(buf))
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            handshake_complete: self.is_handshake_complete(),
            ..SessionInfo::default()
        }
    }

    fn drain_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }
}
