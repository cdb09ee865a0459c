// beanery-core: 应用级 Bean 管理器
//
// 提供以 Symbol 为键的依赖管理：
// - 四种构造策略（值、组件、工厂、别名）
// - 懒加载与 eager 构造、multi 注册
// - 装饰器
// - 按运行级别分组的异步初始化器
// - 按 destroy order 的有序销毁

pub mod bean;
pub mod component;
pub mod config;
pub mod decorator;
pub mod error;
pub mod initializer;
pub mod lifecycle;
pub mod logging;
pub mod manager;
pub mod symbol;

// 重新导出常用类型
pub use bean::{BeanInstructions, Construct, StrategyKind};
pub use component::Component;
pub use config::{BeanManagerConfig, DEFAULT_RUNLEVEL_ENV, EAGER_RUNLEVEL_ENV};
pub use decorator::{BeanDecorator, DecoratorInstructions};
pub use error::{BeanError, BeanResult, Result};
pub use initializer::{Initializer, InitializerInstructions};
pub use lifecycle::{Phase, PreDestroy};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use manager::{BeanManager, Registration};
pub use symbol::{Symbol, SymbolId, SymbolKey};

// 导出 async_trait，实现 Initializer 时使用
pub use async_trait;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::BeanInstructions;
    pub use crate::component::Component;
    pub use crate::config::BeanManagerConfig;
    pub use crate::decorator::{BeanDecorator, DecoratorInstructions};
    pub use crate::error::{BeanError, BeanResult, Result};
    pub use crate::initializer::{Initializer, InitializerInstructions};
    pub use crate::lifecycle::{Phase, PreDestroy};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::manager::{BeanManager, Registration};
    pub use crate::symbol::Symbol;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
