use std::sync::{Arc, OnceLock};

use rustls::crypto::CryptoProvider;
use tracing::debug;

/// 进程级一次性初始化结果。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 随机源与算法表只需构建一次；与其依赖模块加载时的隐式副作用，不如返回显式令牌，
///   让测试可以控制初始化的顺序与重复；
/// - 构建引擎上下文必须出示令牌，从类型上保证“先初始化、后使用”。
///
/// ## 契约（What）
/// - [`initialize`] 可重复调用，返回的令牌共享同一个 `CryptoProvider`；
/// - 初始化由 `OnceLock` 串行化，多线程并发调用也只会构建一次。
#[derive(Clone, Debug)]
pub struct LibraryToken {
    provider: Arc<CryptoProvider>,
}

impl LibraryToken {
    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }
}

static PROVIDER: OnceLock<Arc<CryptoProvider>> = OnceLock::new();

/// 执行一次性初始化并返回令牌。
pub fn initialize() -> LibraryToken {
    let provider = PROVIDER.get_or_init(|| {
        let provider = rustls::crypto::ring::default_provider();
        debug!(
            cipher_suites = provider.cipher_suites.len(),
            kx_groups = provider.kx_groups.len(),
            "tls library initialized"
        );
        Arc::new(provider)
    });
    LibraryToken {
        provider: provider.clone(),
    }
}
