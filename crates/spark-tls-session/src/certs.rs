//! 证书与私钥装载。
//!
//! 只负责“给一段 PEM/DER，得到通过或失败”；证书链校验策略由引擎负责。

use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ConfigError;

/// 服务端证书信任库。
#[derive(Clone, Debug)]
pub struct TrustStore {
    roots: RootCertStore,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustStore {
    pub fn new() -> Self {
        Self {
            roots: RootCertStore::empty(),
        }
    }

    /// 添加一张 DER 编码的信任锚。
    pub fn add_der(&mut self, der: &[u8]) -> Result<(), ConfigError> {
        self.roots
            .add(CertificateDer::from(der.to_vec()))
            .map_err(|err| ConfigError::Certificate {
                reason: err.to_string(),
            })
    }

    /// 添加 PEM 文本中的全部 `CERTIFICATE` 块，返回添加数量。
    ///
    /// 不含任何证书块的输入视为失败；任一证书被拒绝时立即返回错误，已添加的证书保留。
    pub fn add_pem(&mut self, pem: &[u8]) -> Result<usize, ConfigError> {
        let mut added = 0;
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|err| ConfigError::Certificate {
                reason: err.to_string(),
            })?;
            self.roots
                .add(cert)
                .map_err(|err| ConfigError::Certificate {
                    reason: err.to_string(),
                })?;
            added += 1;
        }
        if added == 0 {
            return Err(ConfigError::Certificate {
                reason: "no CERTIFICATE block found".to_owned(),
            });
        }
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub(crate) fn roots(&self) -> &RootCertStore {
        &self.roots
    }
}

/// 客户端身份（双向认证用）：证书链 + 私钥。
#[derive(Debug)]
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    /// 从 PEM 文本装载，证书链按出现顺序排列，叶子证书在前。
    pub fn from_pem(chain_pem: &[u8], key_pem: &[u8]) -> Result<Self, ConfigError> {
        let chain = CertificateDer::pem_slice_iter(chain_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ConfigError::Certificate {
                reason: err.to_string(),
            })?;
        if chain.is_empty() {
            return Err(ConfigError::Certificate {
                reason: "client certificate chain is empty".to_owned(),
            });
        }
        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|err| ConfigError::PrivateKey {
            reason: err.to_string(),
        })?;
        Ok(Self { chain, key })
    }

    /// 从 DER 证书链与 PKCS#8 私钥装载。
    pub fn from_der(chain: Vec<Vec<u8>>, pkcs8_key: Vec<u8>) -> Result<Self, ConfigError> {
        if chain.is_empty() {
            return Err(ConfigError::Certificate {
                reason: "client certificate chain is empty".to_owned(),
            });
        }
        if pkcs8_key.is_empty() {
            return Err(ConfigError::PrivateKey {
                reason: "private key is empty".to_owned(),
            });
        }
        Ok(Self {
            chain: chain.into_iter().map(CertificateDer::from).collect(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkcs8_key)),
        })
    }

    pub(crate) fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.chain, self.key)
    }
}
