use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    ClientConfig, ClientConnection, DigitallySignedStruct, IoState, SignatureScheme,
    SupportedProtocolVersion,
};
use tracing::{debug, trace};

use crate::certs::{ClientIdentity, TrustStore};
use crate::channel::{ByteChannelPair, ByteQueue};
use crate::config::{TlsClientSettings, TlsVersion, VerifyMode};
use crate::error::{ConfigError, EngineError, EngineErrorKind};
use crate::init::LibraryToken;

use super::{EngineConnection, SessionInfo, TlsEngine};

/// 明文积压达到该值后暂停从入站队列拉取密文，剩余密文留待下一次读取。
const PLAINTEXT_BACKLOG_LIMIT: usize = 16 * 1024;

/// 诊断队列保留的最大条目数，超出时丢弃最旧的条目。
const DIAGNOSTIC_CAPACITY: usize = 32;

/// 基于 `rustls` 的引擎上下文。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把 `rustls::ClientConfig` 与目标主机名封装为 [`TlsEngine`]，使会话核心只依赖能力接口；
/// - 配置来自 [`TlsClientSettings`]，密码套件、密钥交换组、版本范围都在此一次性校验。
///
/// ## 契约（What）
/// - 构造需要 [`LibraryToken`]，保证一次性初始化先于任何连接创建；
/// - 默认版本范围为 TLS 1.2 ~ 1.3，TLS 1.2 的保留是为兼容老旧对端而有意放宽的；
/// - `verify = "none"` 时不校验服务端证书链，仅校验握手签名本身。
#[derive(Clone, Debug)]
pub struct RustlsEngine {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
    inbound_limit: Option<usize>,
}

impl RustlsEngine {
    /// 按设置组装 `ClientConfig`。
    ///
    /// # 逻辑（How）
    /// 1. 校验版本范围并裁剪出允许的协议版本；
    /// 2. 在初始化得到的 `CryptoProvider` 副本上按名称筛选密码套件与密钥交换组；
    /// 3. 依据校验模式挂载信任库或“仅校验签名”的校验器；
    /// 4. 可选挂载客户端身份，最后写入 ALPN 列表。
    pub fn from_settings(
        token: &LibraryToken,
        settings: &TlsClientSettings,
        trust: &TrustStore,
        identity: Option<ClientIdentity>,
    ) -> Result<Self, ConfigError> {
        if settings.min_version > settings.max_version {
            return Err(ConfigError::VersionRange {
                min: settings.min_version.to_string(),
                max: settings.max_version.to_string(),
            });
        }
        let server_name = ServerName::try_from(settings.server_name.clone())
            .map_err(|_| ConfigError::InvalidServerName(settings.server_name.clone()))?;

        let provider = Arc::new(select_provider(token.provider(), settings)?);
        let versions = protocol_versions(settings.min_version, settings.max_version);
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)?;

        let builder = match settings.verify {
            VerifyMode::Peer => {
                if trust.is_empty() {
                    return Err(ConfigError::EmptyTrustStore);
                }
                builder.with_root_certificates(trust.roots().clone())
            }
            VerifyMode::None => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SignatureOnlyVerifier {
                    algorithms: provider.signature_verification_algorithms,
                })),
        };

        let mut config = match identity {
            Some(identity) => {
                let (chain, key) = identity.into_parts();
                builder.with_client_auth_cert(chain, key)?
            }
            None => builder.with_no_client_auth(),
        };
        config.alpn_protocols = settings
            .alpn_protocols
            .iter()
            .map(|proto| proto.as_bytes().to_vec())
            .collect();

        debug!(
            server_name = %settings.server_name,
            min_version = %settings.min_version,
            max_version = %settings.max_version,
            verify = ?settings.verify,
            "tls engine context configured"
        );

        Ok(Self {
            config: Arc::new(config),
            server_name,
            inbound_limit: settings.inbound_limit,
        })
    }
}

impl TlsEngine for RustlsEngine {
    type Connection = RustlsConnection;

    fn new_connection(&self) -> Result<RustlsConnection, EngineError> {
        let conn = ClientConnection::new(self.config.clone(), self.server_name.clone())
            .map_err(|err| EngineError::new(EngineErrorKind::Other, err.to_string()))?;
        Ok(RustlsConnection {
            conn,
            server_name: self.server_name.to_str().into_owned(),
            client_mode: false,
            close_notify_sent: false,
            records: RecordTracker::default(),
            diagnostics: Vec::new(),
        })
    }

    fn inbound_limit(&self) -> Option<usize> {
        self.inbound_limit
    }
}

/// `rustls::ClientConnection` 的适配层。
///
/// 每个动作遵循同一节奏：从入站队列拉取全部可用密文并处理，随后把引擎待发送的所有记录
/// 推入出站队列。因此一次引擎动作恰好对应一批出站字节。
#[derive(Debug)]
pub struct RustlsConnection {
    conn: ClientConnection,
    server_name: String,
    client_mode: bool,
    close_notify_sent: bool,
    records: RecordTracker,
    diagnostics: Vec<String>,
}

impl RustlsConnection {
    /// 记录诊断并原样返回错误。
    fn record(&mut self, err: EngineError) -> EngineError {
        if self.diagnostics.len() == DIAGNOSTIC_CAPACITY {
            self.diagnostics.remove(0);
        }
        self.diagnostics.push(err.to_string());
        err
    }

    fn process(&mut self) -> Result<IoState, EngineError> {
        match self.conn.process_new_packets() {
            // rustls 只在允许应用数据后才承认 close_notify，握手期间的明文告警由记录跟踪器识别。
            Ok(state)
                if self.conn.is_handshaking()
                    && (state.peer_has_closed() || self.records.close_notify_seen) =>
            {
                Err(self.record(EngineError::new(
                    EngineErrorKind::ZeroReturn,
                    "peer closed the connection during the handshake",
                )))
            }
            Ok(state) => Ok(state),
            Err(err) => Err(self.record(EngineError::new(EngineErrorKind::Protocol, err.to_string()))),
        }
    }

    /// 从入站队列拉取密文并处理，明文积压达到上限时暂停，剩余密文留在队列中。
    fn pump_inbound(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        let mut state = self.process()?;
        while !io.inbound().is_empty() {
            let backlog = state.plaintext_bytes_to_read();
            if backlog >= PLAINTEXT_BACKLOG_LIMIT {
                trace!(backlog, "plaintext backlog full, inbound pull paused");
                break;
            }
            let mut reader = TrackingReader {
                inner: io.inbound_mut(),
                records: &mut self.records,
            };
            match self.conn.read_tls(&mut reader) {
                Ok(0) => break,
                Ok(n) => trace!(bytes = n, "ciphertext pulled from inbound queue"),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                // 引擎自身的明文缓冲已满：先让调用方读走明文。
                Err(err) if backlog > 0 => {
                    trace!(backlog, error = %err, "engine refused more ciphertext");
                    break;
                }
                Err(err) => {
                    return Err(
                        self.record(EngineError::new(EngineErrorKind::Transport, err.to_string()))
                    );
                }
            }
            state = self.process()?;
        }
        Ok(())
    }

    fn flush_outbound(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        let outbound = io.outbound_mut();
        while self.conn.wants_write() {
            match self.conn.write_tls(outbound) {
                Ok(n) => trace!(bytes = n, "ciphertext pushed to outbound queue"),
                Err(err) => {
                    return Err(
                        self.record(EngineError::new(EngineErrorKind::Transport, err.to_string()))
                    );
                }
            }
        }
        Ok(())
    }
}

impl EngineConnection for RustlsConnection {
    fn set_client_mode(&mut self) {
        self.client_mode = true;
    }

    fn advance_handshake(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        if !self.client_mode {
            return Err(self.record(EngineError::new(
                EngineErrorKind::Protocol,
                "connection role not set before the first handshake step",
            )));
        }
        let pumped = self.pump_inbound(io);
        // 即使处理失败也要推出引擎已排队的记录（通常是致命告警）。
        let flushed = self.flush_outbound(io);
        pumped?;
        flushed?;
        if self.conn.is_handshaking() && self.conn.wants_read() {
            return Err(EngineError::want_read());
        }
        Ok(())
    }

    fn is_handshake_complete(&self) -> bool {
        !self.conn.is_handshaking()
    }

    fn shutdown(&mut self, io: &mut ByteChannelPair) -> Result<(), EngineError> {
        if !self.close_notify_sent {
            self.conn.send_close_notify();
            self.close_notify_sent = true;
        }
        self.flush_outbound(io)
    }

    fn read_plaintext(
        &mut self,
        io: &mut ByteChannelPair,
        buf: &mut [u8],
    ) -> Result<usize, EngineError> {
        let pumped = self.pump_inbound(io);
        let flushed = self.flush_outbound(io);
        pumped?;
        flushed?;
        match self.conn.reader().read(buf) {
            Ok(0) if !buf.is_empty() => Err(EngineError::new(
                EngineErrorKind::ZeroReturn,
                "peer sent close_notify",
            )),
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(EngineError::want_read()),
            Err(err) => Err(self.record(EngineError::new(EngineErrorKind::Transport, err.to_string()))),
        }
    }

    fn write_plaintext(
        &mut self,
        io: &mut ByteChannelPair,
        buf: &[u8],
    ) -> Result<usize, EngineError> {
        let written = self
            .conn
            .writer()
            .write(buf)
            .map_err(|err| EngineError::new(EngineErrorKind::Other, err.to_string()))?;
        self.flush_outbound(io)?;
        Ok(written)
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            protocol_version: self.conn.protocol_version().map(u16::from),
            cipher_suite: self
                .conn
                .negotiated_cipher_suite()
                .map(|suite| u16::from(suite.suite())),
            alpn_protocol: self.conn.alpn_protocol().map(<[u8]>::to_vec),
            server_name: Some(self.server_name.clone()),
            peer_certificates: self
                .conn
                .peer_certificates()
                .map(|chain| chain.iter().map(|cert| cert.as_ref().to_vec()).collect())
                .unwrap_or_default(),
            handshake_complete: !self.conn.is_handshaking(),
        }
    }

    fn drain_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }
}

const CONTENT_TYPE_ALERT: u8 = 0x15;
const ALERT_CLOSE_NOTIFY: u8 = 0;
const RECORD_HEADER_LEN: usize = 5;

/// 沿密文流逐字节跟踪记录边界，识别明文 close_notify 告警记录。
///
/// 明文告警记录的长度恰为 2（级别 + 描述）；加密后的告警要么带 AEAD 标签更长，
/// 要么在 TLS 1.3 中伪装为 application_data，因此长度为 2 的告警记录必然是明文。
#[derive(Debug, Default)]
struct RecordTracker {
    header: [u8; RECORD_HEADER_LEN],
    header_len: usize,
    body_remaining: usize,
    alert: Option<[u8; 2]>,
    alert_len: usize,
    close_notify_seen: bool,
}

impl RecordTracker {
    fn observe(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.body_remaining == 0 {
                let take = (RECORD_HEADER_LEN - self.header_len).min(bytes.len());
                self.header[self.header_len..self.header_len + take]
                    .copy_from_slice(&bytes[..take]);
                self.header_len += take;
                bytes = &bytes[take..];
                if self.header_len == RECORD_HEADER_LEN {
                    self.header_len = 0;
                    let len = usize::from(u16::from_be_bytes([self.header[3], self.header[4]]));
                    self.body_remaining = len;
                    self.alert_len = 0;
                    self.alert = (self.header[0] == CONTENT_TYPE_ALERT && len == 2).then_some([0; 2]);
                }
                continue;
            }
            let take = self.body_remaining.min(bytes.len());
            if let Some(alert) = self.alert.as_mut() {
                for &byte in &bytes[..take] {
                    alert[self.alert_len] = byte;
                    self.alert_len += 1;
                }
            }
            self.body_remaining -= take;
            bytes = &bytes[take..];
            if self.body_remaining == 0 {
                if let Some([_, description]) = self.alert.take() {
                    self.close_notify_seen |= description == ALERT_CLOSE_NOTIFY;
                }
            }
        }
    }
}

/// 把入站队列交给引擎读取，同时把读出的字节送入记录跟踪器。
struct TrackingReader<'a> {
    inner: &'a mut ByteQueue,
    records: &'a mut RecordTracker,
}

impl Read for TrackingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = Read::read(&mut *self.inner, buf)?;
        self.records.observe(&buf[..n]);
        Ok(n)
    }
}

fn protocol_versions(min: TlsVersion, max: TlsVersion) -> Vec<&'static SupportedProtocolVersion> {
    [
        (TlsVersion::Tls12, &rustls::version::TLS12),
        (TlsVersion::Tls13, &rustls::version::TLS13),
    ]
    .into_iter()
    .filter(|(version, _)| (min..=max).contains(version))
    .map(|(_, supported)| supported)
    .collect()
}

/// 在基础 provider 的副本上按名称筛选密码套件与密钥交换组，保留调用方给定的顺序。
fn select_provider(
    base: &CryptoProvider,
    settings: &TlsClientSettings,
) -> Result<CryptoProvider, ConfigError> {
    let mut provider = base.clone();
    if !settings.cipher_suites.is_empty() {
        provider.cipher_suites = settings
            .cipher_suites
            .iter()
            .map(|name| {
                base.cipher_suites
                    .iter()
                    .find(|suite| format!("{:?}", suite.suite()).eq_ignore_ascii_case(name))
                    .copied()
                    .ok_or_else(|| ConfigError::UnknownCipherSuite(name.clone()))
            })
            .collect::<Result<_, _>>()?;
    }
    if !settings.kx_groups.is_empty() {
        provider.kx_groups = settings
            .kx_groups
            .iter()
            .map(|name| {
                base.kx_groups
                    .iter()
                    .find(|group| format!("{:?}", group.name()).eq_ignore_ascii_case(name))
                    .copied()
                    .ok_or_else(|| ConfigError::UnknownKxGroup(name.clone()))
            })
            .collect::<Result<_, _>>()?;
    }
    Ok(provider)
}

/// 不校验证书链、只校验握手签名的服务端校验器，对应 `verify = "none"`。
#[derive(Debug)]
struct SignatureOnlyVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for SignatureOnlyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::initialize;

    fn settings() -> TlsClientSettings {
        TlsClientSettings {
            verify: VerifyMode::None,
            ..TlsClientSettings::default()
        }
    }

    #[test]
    fn record_tracker_spots_plaintext_close_notify_across_splits() {
        let stream = [
            0x16, 0x03, 0x03, 0x00, 0x01, 0xaa, // 1 字节握手记录
            0x15, 0x03, 0x03, 0x00, 0x02, 0x01, 0x00, // warning close_notify
        ];
        let mut records = RecordTracker::default();
        for byte in stream {
            records.observe(&[byte]);
        }
        assert!(records.close_notify_seen);

        let mut records = RecordTracker::default();
        records.observe(&stream[..8]);
        assert!(!records.close_notify_seen);
        records.observe(&stream[8..]);
        assert!(records.close_notify_seen);
    }

    #[test]
    fn record_tracker_ignores_other_alerts() {
        let mut records = RecordTracker::default();
        records.observe(&[0x15, 0x03, 0x03, 0x00, 0x02, 0x02, 0x28]);
        // 长度超过 2 的告警记录只可能是密文。
        records.observe(&[0x15, 0x03, 0x03, 0x00, 0x1a]);
        records.observe(&[0u8; 0x1a]);
        records.observe(&[0x17, 0x03, 0x03, 0x00, 0x02, 0x01, 0x00]);
        assert!(!records.close_notify_seen);
    }

    #[test]
    fn version_window_is_inclusive() {
        assert_eq!(protocol_versions(TlsVersion::Tls12, TlsVersion::Tls13).len(), 2);
        let only13 = protocol_versions(TlsVersion::Tls13, TlsVersion::Tls13);
        assert_eq!(only13.len(), 1);
        assert_eq!(only13[0].version, rustls::ProtocolVersion::TLSv1_3);
    }

    #[test]
    fn cipher_suites_are_selected_by_name_in_order() {
        let token = initialize();
        let mut settings = settings();
        settings.cipher_suites = vec![
            "tls13_chacha20_poly1305_sha256".into(),
            "TLS13_AES_128_GCM_SHA256".into(),
        ];
        let provider = select_provider(token.provider(), &settings).expect("known suites");
        let names: Vec<String> = provider
            .cipher_suites
            .iter()
            .map(|suite| format!("{:?}", suite.suite()))
            .collect();
        assert_eq!(
            names,
            ["TLS13_CHACHA20_POLY1305_SHA256", "TLS13_AES_128_GCM_SHA256"]
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        let token = initialize();
        let mut settings = settings();
        settings.kx_groups = vec!["brainpoolP512r1".into()];
        let err = RustlsEngine::from_settings(&token, &settings, &TrustStore::new(), None)
            .expect_err("unknown group must be rejected");
        assert!(matches!(err, ConfigError::UnknownKxGroup(name) if name == "brainpoolP512r1"));
    }

    #[test]
    fn inverted_version_range_is_rejected() {
        let token = initialize();
        let mut settings = settings();
        settings.min_version = TlsVersion::Tls13;
        settings.max_version = TlsVersion::Tls12;
        let err = RustlsEngine::from_settings(&token, &settings, &TrustStore::new(), None)
            .expect_err("empty range");
        assert!(matches!(err, ConfigError::VersionRange { .. }));
    }

    #[test]
    fn peer_verification_requires_trust_anchors() {
        let token = initialize();
        let settings = TlsClientSettings::default();
        let err = RustlsEngine::from_settings(&token, &settings, &TrustStore::new(), None)
            .expect_err("no anchors");
        assert!(matches!(err, ConfigError::EmptyTrustStore));
    }

    #[test]
    fn handshake_step_before_client_mode_is_a_protocol_error() {
        let token = initialize();
        let engine = RustlsEngine::from_settings(&token, &settings(), &TrustStore::new(), None)
            .expect("engine");
        let mut conn = engine.new_connection().expect("connection");
        let mut io = ByteChannelPair::new();
        let err = conn.advance_handshake(&mut io).expect_err("role not set");
        assert_eq!(err.kind, EngineErrorKind::Protocol);
        assert_eq!(conn.drain_diagnostics().len(), 1);
        assert!(conn.drain_diagnostics().is_empty());
    }

    #[test]
    fn first_step_emits_client_hello_and_waits_for_server() {
        let token = initialize();
        let engine = RustlsEngine::from_settings(&token, &settings(), &TrustStore::new(), None)
            .expect("engine");
        let mut conn = engine.new_connection().expect("connection");
        let mut io = ByteChannelPair::new();
        conn.set_client_mode();
        let err = conn.advance_handshake(&mut io).expect_err("waits for ServerHello");
        assert_eq!(err.kind, EngineErrorKind::WantRead);
        // 握手记录类型 0x16。
        assert!(io.outbound().pending() > 5);
        let mut head = [0u8; 1];
        io.outbound_mut().read(&mut head);
        assert_eq!(head[0], 0x16);
        assert!(!conn.is_handshake_complete());
    }
}
