//! 集成测试共用的对端与证书夹具。
//!
//! # 设计动机（Why）
//! - 会话核心只扮演客户端，测试需要一个可逐批喂入字节的服务端；这里直接驱动
//!   `rustls::ServerConnection`，它与被测引擎同源，行为确定；
//! - 证书由 `rcgen` 现场生成，自签名证书同时作为客户端信任锚。
//!
//! # 契约（What）
//! - [`ScriptedServer::feed`]：把客户端产出的整批密文交给服务端处理；
//! - [`ScriptedServer::drain`]：取走服务端待发送的全部密文；
//! - [`complete_handshake`]：以锁步方式交换批次直到双方握手完成，返回往返轮数。

#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, ServerConnection, SupportedProtocolVersion};
use spark_tls_session::{
    Harvest, RustlsEngine, RustlsSession, SessionHandle, TlsClientSettings, TrustStore,
    initialize,
};

/// 自签名证书与私钥。
pub struct Pki {
    pub cert_der: CertificateDer<'static>,
    pub cert_pem: String,
    pub key_der: Vec<u8>,
    pub key_pem: String,
}

pub fn pki_for(name: &str) -> Pki {
    let certified =
        rcgen::generate_simple_self_signed(vec![name.to_owned()]).expect("rcgen self-signed");
    Pki {
        cert_der: certified.cert.der().clone(),
        cert_pem: certified.cert.pem(),
        key_der: certified.key_pair.serialize_der(),
        key_pem: certified.key_pair.serialize_pem(),
    }
}

pub fn pki() -> Pki {
    pki_for("localhost")
}

/// 信任 `pki` 的客户端引擎，`tweak` 可在构建前调整设置。
pub fn client_engine(pki: &Pki, tweak: impl FnOnce(&mut TlsClientSettings)) -> RustlsEngine {
    let token = initialize();
    let mut trust = TrustStore::new();
    trust
        .add_pem(pki.cert_pem.as_bytes())
        .expect("trust anchor accepted");
    let mut settings = TlsClientSettings::default();
    tweak(&mut settings);
    RustlsEngine::from_settings(&token, &settings, &trust, None).expect("engine context")
}

pub fn client_session(engine: &RustlsEngine) -> RustlsSession {
    SessionHandle::create(engine).expect("session created")
}

pub struct ServerOptions<'a> {
    pub versions: &'a [&'static SupportedProtocolVersion],
    pub alpn: Vec<Vec<u8>>,
    pub client_ca: Option<&'a Pki>,
}

impl Default for ServerOptions<'_> {
    fn default() -> Self {
        Self {
            versions: rustls::DEFAULT_VERSIONS,
            alpn: Vec::new(),
            client_ca: None,
        }
    }
}

pub struct ScriptedServer {
    conn: ServerConnection,
}

impl ScriptedServer {
    pub fn new(pki: &Pki) -> Self {
        Self::with_options(pki, ServerOptions::default())
    }

    pub fn with_options(pki: &Pki, options: ServerOptions<'_>) -> Self {
        let provider = Arc::new(ring::default_provider());
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(options.versions)
            .expect("server versions");
        let builder = match options.client_ca {
            Some(ca) => {
                let mut roots = RootCertStore::empty();
                roots.add(ca.cert_der.clone()).expect("client ca");
                let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                    .build()
                    .expect("client verifier");
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };
        let mut config = builder
            .with_single_cert(
                vec![pki.cert_der.clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.key_der.clone())),
            )
            .expect("server certificate");
        config.alpn_protocols = options.alpn;
        Self {
            conn: ServerConnection::new(Arc::new(config)).expect("server connection"),
        }
    }

    /// 处理一整批客户端密文。
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<(), rustls::Error> {
        while !bytes.is_empty() {
            self.conn.read_tls(&mut bytes).expect("server read_tls");
            self.conn.process_new_packets()?;
        }
        Ok(())
    }

    pub fn drain(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while self.conn.wants_write() {
            self.conn.write_tls(&mut out).expect("server write_tls");
        }
        out
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    pub fn send_plaintext(&mut self, data: &[u8]) {
        self.conn.writer().write_all(data).expect("server plaintext write");
    }

    /// 读出当前全部可读明文。
    pub fn read_plaintext(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match self.conn.reader().read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => panic!("server plaintext read failed: {err}"),
            }
        }
        out
    }

    pub fn send_close_notify(&mut self) {
        self.conn.send_close_notify();
    }

    pub fn peer_has_closed(&mut self) -> bool {
        self.conn
            .process_new_packets()
            .map(|state| state.peer_has_closed())
            .unwrap_or(false)
    }
}

/// 驱动客户端会话与服务端锁步交换，直到双方握手完成，返回使用的轮数。
pub fn complete_handshake(session: &mut RustlsSession, server: &mut ScriptedServer) -> usize {
    let mut out = vec![0u8; 64 * 1024];
    let mut inbound: Option<Vec<u8>> = None;
    for round in 1..=8 {
        let produced = match session.step(inbound.as_deref(), &mut out) {
            Ok(Harvest::Produced(n)) => n,
            other => panic!("round {round}: unexpected handshake outcome {other:?}"),
        };
        if produced > 0 {
            server
                .feed(&out[..produced])
                .expect("server accepts client flight");
        }
        let reply = server.drain();
        if session.is_handshake_complete() && !server.is_handshaking() && reply.is_empty() {
            return round;
        }
        inbound = (!reply.is_empty()).then_some(reply);
    }
    panic!("handshake did not complete within 8 rounds");
}
