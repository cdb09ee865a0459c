//! 启动初始化器与运行级别
//!
//! 初始化器在 `start()` 期间按运行级别分组执行：低运行级别的初始化器全部完成后，
//! 才会开始执行更高运行级别的初始化器；同一运行级别内并发执行。

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::component::Component;
use crate::error::Result;
use crate::manager::BeanManager;
use crate::symbol::Symbol;

/// 初始化器 trait
///
/// # 示例
///
/// ```
/// use beanery_core::prelude::*;
///
/// struct SchemaMigration;
///
/// #[async_trait::async_trait]
/// impl Initializer for SchemaMigration {
///     async fn init(&self) -> anyhow::Result<()> {
///         // 执行迁移
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Initializer: Send + Sync {
    async fn init(&self) -> Result<()>;
}

pub(crate) type InitFuture = BoxFuture<'static, Result<()>>;

pub(crate) type InitFn = Arc<dyn Fn(BeanManager) -> InitFuture + Send + Sync>;

/// 初始化器注册说明
#[derive(Clone)]
pub struct InitializerInstructions {
    kind: &'static str,
    run: InitFn,
    runlevel: Option<u32>,
}

impl InitializerInstructions {
    /// 使用异步函数
    pub fn use_function<F, Fut>(function: F) -> Self
    where
        F: Fn(BeanManager) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            kind: "use_function",
            run: Arc::new(move |beans: BeanManager| -> InitFuture { function(beans).boxed() }),
            runlevel: None,
        }
    }

    /// 运行时构造 `C` 并调用其 `init`
    pub fn use_class<C>() -> Self
    where
        C: Component + Initializer,
    {
        Self {
            kind: "use_class",
            run: Arc::new(|beans: BeanManager| -> InitFuture {
                async move {
                    let initializer = C::create(&beans)?;
                    initializer.init().await
                }
                .boxed()
            }),
            runlevel: None,
        }
    }

    /// 运行时查找已注册的 Bean 并调用其 `init`
    pub fn use_existing<T>(symbol: Symbol<T>) -> Self
    where
        T: ?Sized + Initializer + 'static,
    {
        Self {
            kind: "use_existing",
            run: Arc::new(move |beans: BeanManager| -> InitFuture {
                let symbol = symbol.clone();
                async move {
                    let initializer = beans.get(&symbol)?;
                    initializer.init().await
                }
                .boxed()
            }),
            runlevel: None,
        }
    }

    /// 绑定到指定运行级别，未指定时使用配置中的默认运行级别
    pub fn runlevel(mut self, runlevel: u32) -> Self {
        self.runlevel = Some(runlevel);
        self
    }

    pub(crate) fn into_entry(self) -> InitializerEntry {
        InitializerEntry {
            run: self.run,
            runlevel: self.runlevel,
        }
    }
}

impl fmt::Debug for InitializerInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializerInstructions")
            .field("kind", &self.kind)
            .field("runlevel", &self.runlevel)
            .finish()
    }
}

#[derive(Clone)]
pub(crate) struct InitializerEntry {
    pub run: InitFn,
    pub runlevel: Option<u32>,
}

impl InitializerEntry {
    pub fn effective_runlevel(&self, default_runlevel: u32) -> u32 {
        self.runlevel.unwrap_or(default_runlevel)
    }
}

/// 已注册初始化器中最高的运行级别；没有初始化器时为默认运行级别
pub(crate) fn highest_runlevel(entries: &[InitializerEntry], default_runlevel: u32) -> u32 {
    entries
        .iter()
        .map(|entry| entry.effective_runlevel(default_runlevel))
        .max()
        .unwrap_or(default_runlevel)
}

/// 按运行级别升序分组
pub(crate) fn group_by_runlevel<I>(items: I) -> BTreeMap<u32, Vec<InitFn>>
where
    I: IntoIterator<Item = (u32, InitFn)>,
{
    let mut groups: BTreeMap<u32, Vec<InitFn>> = BTreeMap::new();
    for (runlevel, run) in items {
        groups.entry(runlevel).or_default().push(run);
    }
    groups
}
