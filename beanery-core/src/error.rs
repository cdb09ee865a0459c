//! 统一的错误处理类型
//!
//! 容器自身的失败使用 [`BeanError`] 表达，调用方可以按种类匹配；
//! 用户提供的回调（工厂、初始化器、销毁钩子）返回 `anyhow::Result`，
//! 通过 `.context()` 附加上下文即可。

use thiserror::Error;

pub use anyhow::Result;

/// Bean 管理器的错误种类
#[derive(Debug, Error)]
pub enum BeanError {
    /// 注册时没有给出任何构造策略
    #[error("No construction strategy given for bean '{symbol}': expected one of use_value, use_class, use_factory or use_existing")]
    MissingStrategy { symbol: String },

    /// 注册时给出了多个构造策略
    #[error("Ambiguous construction strategy for bean '{symbol}': {strategies:?} given, exactly one expected")]
    AmbiguousStrategy {
        symbol: String,
        strategies: Vec<&'static str>,
    },

    /// 同一个 Symbol 下混用了 multi 与非 multi 注册
    #[error("Cannot mix multi and non-multi registrations under bean '{symbol}'")]
    MultiMismatch { symbol: String },

    /// 当前生命周期状态不允许该操作
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// 没有找到 Bean，且调用方没有提供兜底值
    #[error("No bean found under '{symbol}'")]
    NullBean { symbol: String },

    /// 期望单个 Bean，但找到多个
    #[error("Multiple beans ({count}) found under '{symbol}'; use all() to look up multi beans")]
    MultiBean { symbol: String, count: usize },

    /// 构造过程中再次进入了同一个 Symbol 的构造
    #[error("Circular construction detected while constructing '{symbol}'")]
    CircularConstruction { symbol: String },

    /// 构造策略本身失败
    #[error("Failed to construct bean '{symbol}': {source:#}")]
    Construction {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    /// 缓存实例的类型与 Symbol 的类型不一致
    #[error("Bean '{symbol}' is not of the expected type '{expected}'")]
    TypeMismatch {
        symbol: String,
        expected: &'static str,
    },

    /// 某个运行级别中的初始化器失败
    #[error("Initializer failed at runlevel {runlevel}: {source:#}")]
    Initializer {
        runlevel: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl BeanError {
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle(message.into())
    }

    /// 把工厂返回的错误归类
    ///
    /// 循环构造错误保持原样向外传播，其余错误包装为 `Construction`。
    pub(crate) fn from_construction(symbol: &str, err: anyhow::Error) -> Self {
        match err.downcast::<BeanError>() {
            Ok(circular @ BeanError::CircularConstruction { .. }) => circular,
            Ok(other) => BeanError::Construction {
                symbol: symbol.to_string(),
                source: other.into(),
            },
            Err(source) => BeanError::Construction {
                symbol: symbol.to_string(),
                source,
            },
        }
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, BeanError::CircularConstruction { .. })
    }
}

pub type BeanResult<T> = std::result::Result<T, BeanError>;
