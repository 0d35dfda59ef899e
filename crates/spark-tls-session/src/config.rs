use std::fmt;

use serde::Deserialize;

use crate::error::ConfigError;

/// 协议版本边界。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "String")]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TryFrom<String> for TlsVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim() {
            "1.2" | "TLSv1.2" => Ok(TlsVersion::Tls12),
            "1.3" | "TLSv1.3" => Ok(TlsVersion::Tls13),
            _ => Err(ConfigError::UnsupportedVersion(value)),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls12 => f.write_str("1.2"),
            TlsVersion::Tls13 => f.write_str("1.3"),
        }
    }
}

/// 服务端证书校验模式。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// 以信任库校验证书链与主机名。
    #[default]
    Peer,
    /// 跳过证书链校验，仅校验握手签名。
    None,
}

/// TLS 客户端设置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 汇总会话创建前需要一次性施加的参数：目标主机、版本范围、校验模式、密码套件、
///   密钥交换组（EC 曲线）、ALPN 以及入站队列上限；
/// - 支持从 TOML 文本装载，字段缺省时取 [`Default`] 值。
///
/// ## 契约（What）
/// - `cipher_suites`/`kx_groups` 为空表示沿用引擎默认集合，名称大小写不敏感；
/// - `inbound_limit` 缺省表示入站队列无上限；
/// - 未知字段直接拒绝，避免拼写错误被静默忽略。
///
/// ## 示例
/// ```toml
/// server_name = "fw.example"
/// min_version = "1.2"
/// max_version = "1.3"
/// verify = "peer"
/// cipher_suites = ["TLS13_AES_128_GCM_SHA256"]
/// kx_groups = ["X25519", "secp256r1"]
/// alpn_protocols = ["http/1.1"]
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsClientSettings {
    pub server_name: String,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    pub verify: VerifyMode,
    pub cipher_suites: Vec<String>,
    pub kx_groups: Vec<String>,
    pub alpn_protocols: Vec<String>,
    pub inbound_limit: Option<usize>,
}

impl Default for TlsClientSettings {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_owned(),
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            verify: VerifyMode::Peer,
            cipher_suites: Vec::new(),
            kx_groups: Vec::new(),
            alpn_protocols: Vec::new(),
            inbound_limit: None,
        }
    }
}

impl TlsClientSettings {
    /// 从 TOML 文本解析设置。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
