//! C ABI 入口。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 固件宿主以“指针 + 长度”的形式调用会话核心；指针/长度配对规则在此处集中校验，
//!   校验通过后转交给安全的驱动函数；
//! - 需要更大缓冲时，所需字节数通过输出长度参数写回，并返回 [`SparkTlsStatus::BufferTooSmall`]。
//!
//! ## 契约（What）
//! - 输入分片：空指针必须配长度 0，非空指针必须配非零长度；
//! - 输出缓冲：`*out_len == 0` 时允许空指针，非零容量必须配非空指针；`out_len` 本身不得为空；
//! - 引擎上下文由 [`spark_tls_engine_new`] 从 TOML 设置文本与 PEM 信任锚构建（内部完成一次性初始化），
//!   由 [`spark_tls_engine_free`] 释放；已创建的会话持有配置的共享引用，释放上下文不影响它们；
//! - 会话句柄由 [`spark_tls_session_new`] 创建、[`spark_tls_session_free`] 释放，释放空指针无操作；
//! - `spark_tls_read`/`spark_tls_write` 失败时返回负值。
//!
//! ## 风险与权衡（Trade-offs）
//! - 句柄不具备线程安全性，宿主必须串行调用同一句柄上的函数。

use std::ptr;
use std::slice;

use tracing::warn;

use crate::certs::TrustStore;
use crate::config::TlsClientSettings;
use crate::driver::{Harvest, HandshakeOutcome, alert, close_notify, handshake};
use crate::engine::RustlsEngine;
use crate::error::{ConfigError, DriverError};
use crate::init::initialize;
use crate::session::{RustlsSession, SessionHandle};

/// 返回给宿主的状态码。
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SparkTlsStatus {
    Success = 0,
    InvalidArgument = 1,
    BufferTooSmall = 2,
    Aborted = 3,
    IoError = 4,
}

impl From<&DriverError> for SparkTlsStatus {
    fn from(err: &DriverError) -> Self {
        match err {
            DriverError::InvalidArgument { .. } => SparkTlsStatus::InvalidArgument,
            DriverError::HandshakeAborted { .. } => SparkTlsStatus::Aborted,
            DriverError::Io { .. } => SparkTlsStatus::IoError,
        }
    }
}

/// 解析输入分片。
///
/// # Safety
/// 非空 `ptr` 必须指向至少 `len` 个可读字节，且在返回切片使用期间保持有效。
unsafe fn input_chunk<'a>(ptr: *const u8, len: usize) -> Result<Option<&'a [u8]>, DriverError> {
    match (ptr.is_null(), len) {
        (true, 0) => Ok(None),
        (true, _) => Err(DriverError::invalid("null input chunk with nonzero length")),
        (false, 0) => Err(DriverError::invalid("input chunk pointer with zero length")),
        (false, len) => Ok(Some(unsafe { slice::from_raw_parts(ptr, len) })),
    }
}

/// 解析输出缓冲描述。
///
/// # Safety
/// 非空 `len` 必须可读写；非空 `ptr` 必须指向至少 `*len` 个可写字节，且与 `len` 不重叠。
unsafe fn output_buffer<'a>(
    ptr: *mut u8,
    len: *mut usize,
) -> Result<(&'a mut [u8], &'a mut usize), DriverError> {
    let Some(len) = (unsafe { len.as_mut() }) else {
        return Err(DriverError::invalid("null output length"));
    };
    match (ptr.is_null(), *len) {
        (true, 0) => Ok((<&mut [u8]>::default(), len)),
        (true, _) => Err(DriverError::invalid("null output buffer with nonzero capacity")),
        (false, capacity) => Ok((unsafe { slice::from_raw_parts_mut(ptr, capacity) }, len)),
    }
}

fn finish(outcome: HandshakeOutcome, out_len: &mut usize) -> SparkTlsStatus {
    match outcome {
        Ok(Harvest::Produced(n)) => {
            *out_len = n;
            SparkTlsStatus::Success
        }
        Ok(Harvest::NeedsLargerBuffer { required }) => {
            *out_len = required;
            SparkTlsStatus::BufferTooSmall
        }
        Err(err) => SparkTlsStatus::from(&err),
    }
}

type ChunkDriver = fn(&mut RustlsSession, Option<&[u8]>, &mut [u8]) -> HandshakeOutcome;

/// # Safety
/// 见模块文档中的指针契约。
unsafe fn drive_with_chunk(
    session: *mut RustlsSession,
    in_ptr: *const u8,
    in_len: usize,
    out_ptr: *mut u8,
    out_len: *mut usize,
    driver: ChunkDriver,
) -> SparkTlsStatus {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return SparkTlsStatus::InvalidArgument;
    };
    let chunk = match unsafe { input_chunk(in_ptr, in_len) } {
        Ok(chunk) => chunk,
        Err(err) => return SparkTlsStatus::from(&err),
    };
    let (out, out_len) = match unsafe { output_buffer(out_ptr, out_len) } {
        Ok(parts) => parts,
        Err(err) => return SparkTlsStatus::from(&err),
    };
    finish(driver(session, chunk, out), out_len)
}

fn build_engine(
    settings: Option<&[u8]>,
    trust_pem: Option<&[u8]>,
) -> Result<RustlsEngine, ConfigError> {
    let settings = match settings {
        Some(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| ConfigError::SettingsEncoding)?;
            TlsClientSettings::from_toml_str(text)?
        }
        None => TlsClientSettings::default(),
    };
    let mut trust = TrustStore::new();
    if let Some(pem) = trust_pem {
        trust.add_pem(pem)?;
    }
    RustlsEngine::from_settings(&initialize(), &settings, &trust, None)
}

/// 从 TOML 设置文本与可选的 PEM 信任锚构建引擎上下文，失败时返回空指针。
///
/// 两个输入都遵循分片配对规则；设置为空时使用默认设置。
///
/// # Safety
/// 非空指针必须指向对应长度的可读字节。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_engine_new(
    settings_ptr: *const u8,
    settings_len: usize,
    trust_pem_ptr: *const u8,
    trust_pem_len: usize,
) -> *mut RustlsEngine {
    let inputs = unsafe {
        (
            input_chunk(settings_ptr, settings_len),
            input_chunk(trust_pem_ptr, trust_pem_len),
        )
    };
    let (Ok(settings), Ok(trust_pem)) = inputs else {
        warn!("tls engine construction rejected: invalid pointer/length pairing");
        return ptr::null_mut();
    };
    match build_engine(settings, trust_pem) {
        Ok(engine) => Box::into_raw(Box::new(engine)),
        Err(err) => {
            warn!(code = err.code(), error = %err, "tls engine construction failed");
            ptr::null_mut()
        }
    }
}

/// 释放引擎上下文；空指针无操作。
///
/// # Safety
/// `engine` 为空或来自 [`spark_tls_engine_new`] 且尚未释放。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_engine_free(engine: *mut RustlsEngine) {
    if !engine.is_null() {
        drop(unsafe { Box::from_raw(engine) });
    }
}

/// 基于引擎上下文创建会话，失败时返回空指针。
///
/// # Safety
/// `engine` 为空或指向有效的 [`RustlsEngine`]。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_session_new(engine: *const RustlsEngine) -> *mut RustlsSession {
    let Some(engine) = (unsafe { engine.as_ref() }) else {
        return ptr::null_mut();
    };
    match SessionHandle::create(engine) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(err) => {
            warn!(error = %err, "tls session creation failed");
            ptr::null_mut()
        }
    }
}

/// 释放会话；空指针无操作。
///
/// # Safety
/// `session` 为空或来自 [`spark_tls_session_new`] 且尚未释放。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_session_free(session: *mut RustlsSession) {
    if session.is_null() {
        return;
    }
    unsafe { Box::from_raw(session) }.destroy();
}

/// 推进握手一步。
///
/// # Safety
/// 见模块文档中的指针契约。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_do_handshake(
    session: *mut RustlsSession,
    in_ptr: *const u8,
    in_len: usize,
    out_ptr: *mut u8,
    out_len: *mut usize,
) -> SparkTlsStatus {
    unsafe { drive_with_chunk(session, in_ptr, in_len, out_ptr, out_len, handshake::step) }
}

/// 处理收到的告警记录。
///
/// # Safety
/// 见模块文档中的指针契约。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_handle_alert(
    session: *mut RustlsSession,
    in_ptr: *const u8,
    in_len: usize,
    out_ptr: *mut u8,
    out_len: *mut usize,
) -> SparkTlsStatus {
    unsafe {
        drive_with_chunk(
            session,
            in_ptr,
            in_len,
            out_ptr,
            out_len,
            alert::process_alert,
        )
    }
}

/// 生成 close_notify。
///
/// # Safety
/// 见模块文档中的指针契约。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_close_notify(
    session: *mut RustlsSession,
    out_ptr: *mut u8,
    out_len: *mut usize,
) -> SparkTlsStatus {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return SparkTlsStatus::InvalidArgument;
    };
    match unsafe { output_buffer(out_ptr, out_len) } {
        Ok((out, out_len)) => finish(close_notify::build_close_notify(session, out), out_len),
        Err(err) => SparkTlsStatus::from(&err),
    }
}

/// 读取应用数据，返回字节数；失败返回 -1。
///
/// # Safety
/// `session` 为空或有效；非空 `buf` 指向至少 `len` 个可写字节。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_read(
    session: *mut RustlsSession,
    buf: *mut u8,
    len: usize,
) -> isize {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return -1;
    };
    let buf: &mut [u8] = match (buf.is_null(), len) {
        (true, 0) => &mut [],
        (true, _) => return -1,
        (false, len) => unsafe { slice::from_raw_parts_mut(buf, len) },
    };
    match session.read(buf) {
        Ok(n) => isize::try_from(n).unwrap_or(isize::MAX),
        Err(_) => -1,
    }
}

/// 写入应用数据，返回字节数；失败返回 -1。
///
/// # Safety
/// `session` 为空或有效；非空 `buf` 指向至少 `len` 个可读字节。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_write(
    session: *mut RustlsSession,
    buf: *const u8,
    len: usize,
) -> isize {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return -1;
    };
    let buf: &[u8] = match (buf.is_null(), len) {
        (true, 0) => &[],
        (true, _) => return -1,
        (false, len) => unsafe { slice::from_raw_parts(buf, len) },
    };
    match session.write(buf) {
        Ok(n) => isize::try_from(n).unwrap_or(isize::MAX),
        Err(_) => -1,
    }
}

/// 把对端密文追加到入站队列，返回接受的字节数；参数非法返回 -1。
///
/// # Safety
/// `session` 为空或有效；非空 `buf` 指向至少 `len` 个可读字节。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_traffic_in(
    session: *mut RustlsSession,
    buf: *const u8,
    len: usize,
) -> isize {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return -1;
    };
    match unsafe { input_chunk(buf, len) } {
        Ok(Some(chunk)) => isize::try_from(session.traffic_in(chunk)).unwrap_or(isize::MAX),
        Ok(None) => 0,
        Err(_) => -1,
    }
}

/// 从出站队列取走密文，返回字节数；参数非法返回 -1。
///
/// # Safety
/// `session` 为空或有效；非空 `buf` 指向至少 `len` 个可写字节。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn spark_tls_traffic_out(
    session: *mut RustlsSession,
    buf: *mut u8,
    len: usize,
) -> isize {
    let Some(session) = (unsafe { session.as_mut() }) else {
        return -1;
    };
    let buf: &mut [u8] = match (buf.is_null(), len) {
        (true, 0) => return 0,
        (true, _) => return -1,
        (false, len) => unsafe { slice::from_raw_parts_mut(buf, len) },
    };
    isize::try_from(session.traffic_out(buf)).unwrap_or(isize::MAX)
}
