//! BeanManager - 应用级的 Bean 容器
//!
//! 负责注册、查找（懒加载或 eager 构造）、装饰、按运行级别启动以及有序销毁。
//!
//! 管理器面向协作式（单线程事件循环）的使用方式：注册表没有跨用户代码持有的锁，
//! 构造函数、工厂、初始化器以及销毁回调中都可以再次调用管理器。

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::bean::{downcast, BeanEntry, BeanInstructions, ErasedBean};
use crate::component::Component;
use crate::config::BeanManagerConfig;
use crate::decorator::{DecoratorEntry, DecoratorInstructions};
use crate::error::{BeanError, BeanResult};
use crate::initializer::{group_by_runlevel, highest_runlevel, InitFn, InitializerEntry, InitializerInstructions};
use crate::lifecycle::{sort_for_destroy, Phase};
use crate::symbol::{Symbol, SymbolId};

#[derive(Default)]
struct Registry {
    beans: HashMap<SymbolId, Vec<Arc<BeanEntry>>>,
    decorators: HashMap<SymbolId, Vec<Arc<DecoratorEntry>>>,
    initializers: Vec<InitializerEntry>,
}

impl Registry {
    fn all_entries(&self) -> Vec<Arc<BeanEntry>> {
        self.beans.values().flatten().cloned().collect()
    }
}

#[derive(Default)]
struct LifecycleState {
    phase: Phase,
    eager_beans_constructed: bool,
}

struct Inner {
    registry: RwLock<Registry>,
    lifecycle: Mutex<LifecycleState>,
    /// 当前运行级别，`None` 表示尚未进入任何运行级别
    runlevel: watch::Sender<Option<u32>>,
    registration_seq: AtomicU64,
    construction_seq: AtomicU64,
}

/// Bean 管理器
///
/// 克隆得到的是同一个管理器的句柄。
///
/// ```
/// use beanery_core::prelude::*;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let beans = BeanManager::new();
/// let greeting = Symbol::<String>::token("greeting");
///
/// beans.register(
///     &greeting,
///     BeanInstructions::new().use_factory(|_| Ok(Arc::new("hello".to_string()))),
/// )?;
/// beans.register_initializer_fn(|beans| async move {
///     tracing::info!("initializing, {} beans registered", beans.symbols().len());
///     Ok(())
/// })?;
///
/// beans.start(BeanManagerConfig::default()).await?;
/// assert_eq!(*beans.get(&greeting)?, "hello");
/// beans.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BeanManager {
    inner: Arc<Inner>,
}

impl BeanManager {
    pub fn new() -> Self {
        let (runlevel, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::default()),
                lifecycle: Mutex::new(LifecycleState::default()),
                runlevel,
                registration_seq: AtomicU64::new(0),
                construction_seq: AtomicU64::new(0),
            }),
        }
    }

    // ==================== 注册 ====================

    /// 注册 Bean
    ///
    /// 非 multi 注册会替换同一 Symbol 下已有的 Bean，被替换的 Bean 先被销毁。
    /// 启动完成后注册的 eager Bean 会立即构造。
    pub fn register<T>(&self, symbol: &Symbol<T>, instructions: BeanInstructions<T>) -> BeanResult<Registration>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let registration_seq = self.inner.registration_seq.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(instructions.into_entry(symbol.key().clone(), registration_seq)?);
        self.register_entry(entry)
    }

    /// 仅当 Symbol 下还没有任何 Bean 时注册，否则返回一个空的注册句柄
    pub fn register_if_absent<T>(
        &self,
        symbol: &Symbol<T>,
        instructions: BeanInstructions<T>,
    ) -> BeanResult<Registration>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self.contains(symbol) {
            tracing::trace!("Bean '{}' already registered, skipping", symbol);
            return Ok(Registration::inert());
        }
        self.register(symbol, instructions)
    }

    /// 以 `C` 自身类型为 Symbol 注册组件
    pub fn register_component<C: Component>(&self) -> BeanResult<Registration> {
        self.register_component_with::<C>(BeanInstructions::new())
    }

    /// 以 `C` 自身类型为 Symbol 注册组件；没有给出构造策略时使用组件自身的构造函数
    pub fn register_component_with<C: Component>(
        &self,
        instructions: BeanInstructions<C>,
    ) -> BeanResult<Registration> {
        let instructions = if instructions.has_strategy() {
            instructions
        } else {
            instructions.use_class::<C>()
        };
        self.register(&Symbol::<C>::of(), instructions)
    }

    fn register_entry(&self, entry: Arc<BeanEntry>) -> BeanResult<Registration> {
        let symbol_id = entry.symbol.id();

        let replaced = {
            let mut registry = self.inner.registry.write();
            match registry.beans.get_mut(&symbol_id) {
                Some(existing) if existing.iter().any(|e| e.multi != entry.multi) => {
                    tracing::warn!("Rejected registration of bean '{}': multi flag mismatch", entry.symbol);
                    return Err(BeanError::MultiMismatch {
                        symbol: entry.symbol.name().to_string(),
                    });
                }
                Some(existing) if !entry.multi => std::mem::take(existing),
                _ => Vec::new(),
            }
        };

        for old in &replaced {
            tracing::debug!("Replacing bean '{}'", old.symbol);
            dispose(old);
        }

        self.inner
            .registry
            .write()
            .beans
            .entry(symbol_id)
            .or_default()
            .push(Arc::clone(&entry));

        tracing::debug!(
            "Bean registered: '{}' ({}, eager={}, multi={}, destroy_order={})",
            entry.symbol,
            entry.kind.name(),
            entry.eager,
            entry.multi,
            entry.destroy_order
        );

        if entry.eager && self.inner.lifecycle.lock().eager_beans_constructed {
            tracing::debug!("Eager bean '{}' registered after start, constructing now", entry.symbol);
            self.get_or_construct(&entry)?;
        }

        Ok(Registration {
            manager: Arc::downgrade(&self.inner),
            entry: Some(entry),
        })
    }

    /// 注册装饰器，可在 start() 之前或启动过程中（例如在初始化器里）调用
    pub fn register_decorator<T>(&self, symbol: &Symbol<T>, decorator: DecoratorInstructions<T>) -> BeanResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let phase = self.phase();
        if !phase.accepts_decorators() {
            return Err(BeanError::lifecycle(format!(
                "Decorators can only be registered before or while starting the bean manager (current phase: {:?})",
                phase
            )));
        }

        let entry = Arc::new(decorator.into_entry(symbol.key().clone()));
        let mut registry = self.inner.registry.write();
        let decorators = registry.decorators.entry(symbol.id()).or_default();
        decorators.push(entry);
        tracing::debug!("Decorator registered for bean '{}', total: {}", symbol, decorators.len());
        Ok(())
    }

    /// 注册初始化器，只能在 start() 之前调用
    pub fn register_initializer(&self, initializer: InitializerInstructions) -> BeanResult<()> {
        let phase = self.phase();
        if phase == Phase::Starting {
            return Err(BeanError::lifecycle(
                "Initializers registered while the bean manager is starting would never run",
            ));
        }
        if !phase.accepts_initializers() {
            return Err(BeanError::lifecycle(format!(
                "Initializers can only be registered before starting the bean manager (current phase: {:?})",
                phase
            )));
        }

        tracing::debug!("Initializer registered: {:?}", initializer);
        self.inner.registry.write().initializers.push(initializer.into_entry());
        Ok(())
    }

    /// 注册一个异步函数作为初始化器（默认运行级别）
    pub fn register_initializer_fn<F, Fut>(&self, function: F) -> BeanResult<()>
    where
        F: Fn(BeanManager) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        self.register_initializer(InitializerInstructions::use_function(function))
    }

    // ==================== 查找 ====================

    /// 获取唯一的 Bean
    pub fn get<T>(&self, symbol: &Symbol<T>) -> BeanResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.lookup_single(symbol)?.ok_or_else(|| BeanError::NullBean {
            symbol: symbol.name().to_string(),
        })
    }

    /// 获取唯一的 Bean，没有注册时返回 `default`
    pub fn get_or<T>(&self, symbol: &Symbol<T>, default: Arc<T>) -> BeanResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Ok(self.lookup_single(symbol)?.unwrap_or(default))
    }

    /// 获取唯一的 Bean，没有注册时调用 `supplier`
    pub fn get_or_else<T, F>(&self, symbol: &Symbol<T>, supplier: F) -> BeanResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        Ok(self.lookup_single(symbol)?.unwrap_or_else(supplier))
    }

    /// 获取唯一的 Bean，没有注册时返回 `None`
    pub fn opt<T>(&self, symbol: &Symbol<T>) -> BeanResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.lookup_single(symbol)
    }

    /// 按注册顺序获取 Symbol 下的所有 Bean
    pub fn all<T>(&self, symbol: &Symbol<T>) -> BeanResult<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entries = self.entries_of(symbol.id());

        if entries.iter().any(|entry| entry.is_constructing()) {
            tracing::error!("Circular construction detected while looking up '{}'", symbol);
            return Err(BeanError::CircularConstruction {
                symbol: symbol.name().to_string(),
            });
        }

        entries
            .iter()
            .map(|entry| {
                let bean = self.get_or_construct(entry)?;
                downcast::<T>(&bean, symbol.key())
            })
            .collect()
    }

    fn lookup_single<T>(&self, symbol: &Symbol<T>) -> BeanResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut beans = self.all(symbol)?;
        match beans.len() {
            0 => Ok(None),
            1 => Ok(beans.pop()),
            count => Err(BeanError::MultiBean {
                symbol: symbol.name().to_string(),
                count,
            }),
        }
    }

    fn entries_of(&self, symbol_id: SymbolId) -> Vec<Arc<BeanEntry>> {
        self.inner
            .registry
            .read()
            .beans
            .get(&symbol_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 检查 Symbol 下是否有注册
    pub fn contains<T: ?Sized>(&self, symbol: &Symbol<T>) -> bool {
        self.inner
            .registry
            .read()
            .beans
            .get(&symbol.id())
            .is_some_and(|entries| !entries.is_empty())
    }

    /// 所有已注册 Symbol 的名称
    pub fn symbols(&self) -> Vec<String> {
        let registry = self.inner.registry.read();
        let mut names: Vec<String> = registry
            .beans
            .values()
            .filter_map(|entries| entries.first())
            .map(|entry| entry.symbol.name().to_string())
            .collect();
        names.sort();
        names
    }

    // ==================== 构造 ====================

    /// 返回缓存的实例，或构造、装饰并缓存
    fn get_or_construct(&self, entry: &Arc<BeanEntry>) -> BeanResult<ErasedBean> {
        if let Some(instance) = entry.instance() {
            tracing::trace!("Returning cached instance of bean '{}'", entry.symbol);
            return Ok(instance);
        }

        let _guard = entry.begin_construction()?;

        tracing::debug!("Constructing bean '{}' ({})", entry.symbol, entry.kind.name());
        let constructed = entry
            .construct(self)
            .map_err(|e| BeanError::from_construction(entry.symbol.name(), e))?;

        let bean = self.decorate(entry, constructed.bean)?;
        let construction_seq = self.inner.construction_seq.fetch_add(1, Ordering::Relaxed);
        entry.complete(Arc::clone(&bean), constructed.hook, construction_seq);

        tracing::trace!("Bean '{}' constructed (sequence {})", entry.symbol, construction_seq);
        Ok(bean)
    }

    /// 应用所有装饰器：先按注册顺序构造装饰器，再从后往前折叠，第一个注册的在最外层
    fn decorate(&self, entry: &BeanEntry, bean: ErasedBean) -> BeanResult<ErasedBean> {
        let decorators = self
            .inner
            .registry
            .read()
            .decorators
            .get(&entry.symbol.id())
            .cloned()
            .unwrap_or_default();

        if decorators.is_empty() {
            return Ok(bean);
        }

        for decorator in &decorators {
            decorator.prepare(self)?;
        }

        tracing::trace!("Applying {} decorator(s) to bean '{}'", decorators.len(), entry.symbol);
        decorators
            .iter()
            .rev()
            .try_fold(bean, |bean, decorator| decorator.apply(self, bean))
    }

    /// 按注册顺序构造所有 eager Bean
    fn construct_eager_beans(&self) -> BeanResult<()> {
        self.inner.lifecycle.lock().eager_beans_constructed = true;

        let mut eager: Vec<Arc<BeanEntry>> = self
            .inner
            .registry
            .read()
            .all_entries()
            .into_iter()
            .filter(|entry| entry.eager)
            .collect();
        eager.sort_by_key(|entry| entry.registration_seq);

        tracing::debug!("Constructing {} eager bean(s)", eager.len());
        for entry in &eager {
            self.get_or_construct(entry)?;
        }
        Ok(())
    }

    // ==================== 生命周期 ====================

    /// 启动管理器
    ///
    /// 按运行级别升序执行初始化器，同一运行级别内并发执行并等待全部结束。
    /// 任一初始化器失败时返回该运行级别的错误，更高的运行级别不再执行。
    pub async fn start(&self, config: BeanManagerConfig) -> BeanResult<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase != Phase::Idle {
                return Err(BeanError::lifecycle(format!(
                    "Bean manager already started (current phase: {:?})",
                    lifecycle.phase
                )));
            }
            lifecycle.phase = Phase::Starting;
        }

        let default_runlevel = config.default_runlevel();
        let initializers = self.inner.registry.read().initializers.clone();
        let eager_runlevel = config
            .eager_bean_construct_runlevel
            .unwrap_or_else(|| highest_runlevel(&initializers, default_runlevel).saturating_add(1));

        let eager_initializer: InitFn = Arc::new(|beans: BeanManager| {
            async move { beans.construct_eager_beans().map_err(anyhow::Error::from) }.boxed()
        });

        let groups = group_by_runlevel(
            initializers
                .iter()
                .map(|entry| (entry.effective_runlevel(default_runlevel), Arc::clone(&entry.run)))
                .chain(std::iter::once((eager_runlevel, eager_initializer))),
        );

        tracing::info!(
            "Starting bean manager: {} initializer(s), eager beans at runlevel {}",
            initializers.len(),
            eager_runlevel
        );

        for (runlevel, group) in groups {
            self.inner.runlevel.send_replace(Some(runlevel));
            tracing::info!("Entering runlevel {} ({} initializer(s))", runlevel, group.len());

            let results = join_all(group.iter().map(|run| run(self.clone()))).await;
            let mut failures: Vec<anyhow::Error> = results.into_iter().filter_map(|r| r.err()).collect();

            if !failures.is_empty() {
                for failure in &failures {
                    tracing::error!("Initializer failed at runlevel {}: {:#}", runlevel, failure);
                }
                self.inner.lifecycle.lock().phase = Phase::Failed;
                return Err(BeanError::Initializer {
                    runlevel,
                    source: failures.remove(0),
                });
            }
        }

        self.inner.lifecycle.lock().phase = Phase::Started;
        tracing::info!("Bean manager started");
        Ok(())
    }

    /// 等待管理器进入（或已经越过）指定的运行级别
    pub fn when_runlevel(&self, runlevel: u32) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.inner.runlevel.subscribe();
        async move {
            let reached = receiver
                .wait_for(|current| current.is_some_and(|current| current >= runlevel))
                .await
                .is_ok();
            if !reached {
                // 管理器已被丢弃，永远不会到达该运行级别
                std::future::pending::<()>().await;
            }
        }
    }

    /// 当前运行级别，`None` 表示尚未启动
    pub fn current_runlevel(&self) -> Option<u32> {
        *self.inner.runlevel.borrow()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lifecycle.lock().phase
    }

    pub fn is_started(&self) -> bool {
        self.phase() == Phase::Started
    }

    /// 销毁所有 Bean 并清空管理器
    ///
    /// 按 destroy order 升序、构造顺序逆序调用销毁回调；回调失败只记录日志，
    /// 不会中断其余 Bean 的销毁。之后可以重新注册并再次启动。
    pub fn destroy(&self) {
        let mut entries = self.inner.registry.read().all_entries();
        sort_for_destroy(&mut entries, |entry| (entry.destroy_order, entry.construction_seq()));

        tracing::info!("Destroying {} bean(s)", entries.len());
        for entry in &entries {
            dispose(entry);
        }

        {
            let mut registry = self.inner.registry.write();
            registry.beans.clear();
            registry.decorators.clear();
            registry.initializers.clear();
        }
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.phase = Phase::Idle;
            lifecycle.eager_beans_constructed = false;
        }
        self.inner.runlevel.send_replace(None);

        tracing::info!("Bean manager destroyed");
    }
}

impl Default for BeanManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BeanManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("BeanManager")
            .field("phase", &self.inner.lifecycle.lock().phase)
            .field("runlevel", &*self.inner.runlevel.borrow())
            .field("symbols", &registry.beans.len())
            .field("decorators", &registry.decorators.len())
            .field("initializers", &registry.initializers.len())
            .finish()
    }
}

/// 释放实例并调用销毁回调，回调的错误和 panic 只记录日志
fn dispose(entry: &BeanEntry) {
    let Some(hook) = entry.release() else {
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => tracing::debug!("Bean '{}' destroyed successfully", entry.symbol),
        Ok(Err(e)) => tracing::warn!("Failed to destroy bean '{}': {:#}", entry.symbol, e),
        Err(_) => tracing::warn!("Pre-destroy hook of bean '{}' panicked", entry.symbol),
    }
}

/// 注册句柄
///
/// 丢弃句柄不会注销 Bean；调用 [`Registration::unregister`] 才会。
pub struct Registration {
    manager: Weak<Inner>,
    entry: Option<Arc<BeanEntry>>,
}

impl Registration {
    fn inert() -> Self {
        Self {
            manager: Weak::new(),
            entry: None,
        }
    }

    /// 注册的 Symbol 名称；空句柄返回 `None`
    pub fn symbol(&self) -> Option<&str> {
        self.entry.as_ref().map(|entry| entry.symbol.name())
    }

    /// 该注册是否仍在注册表中
    pub fn is_registered(&self) -> bool {
        let (Some(inner), Some(entry)) = (self.manager.upgrade(), self.entry.as_ref()) else {
            return false;
        };
        let registry = inner.registry.read();
        let registered = registry
            .beans
            .get(&entry.symbol.id())
            .is_some_and(|entries| entries.iter().any(|e| Arc::ptr_eq(e, entry)));
        registered
    }

    /// 注销该 Bean：调用销毁回调并从注册表移除
    pub fn unregister(self) {
        let (Some(inner), Some(entry)) = (self.manager.upgrade(), self.entry) else {
            return;
        };

        let removed = {
            let mut registry = inner.registry.write();
            let symbol_id = entry.symbol.id();
            let Some(entries) = registry.beans.get_mut(&symbol_id) else {
                return;
            };
            let before = entries.len();
            entries.retain(|e| !Arc::ptr_eq(e, &entry));
            let removed = entries.len() != before;
            if entries.is_empty() {
                registry.beans.remove(&symbol_id);
            }
            removed
        };

        if removed {
            tracing::debug!("Unregistering bean '{}'", entry.symbol);
            dispose(&entry);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("symbol", &self.symbol())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::BeanDecorator;
    use crate::error::Result;
    use crate::initializer::Initializer;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;

    type LogBuffer = Mutex<Vec<String>>;
    type Log = Arc<LogBuffer>;

    fn new_log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn log_symbol() -> Symbol<LogBuffer> {
        Symbol::of()
    }

    fn string_factory(value: &'static str) -> BeanInstructions<String> {
        BeanInstructions::new().use_factory(move |_| Ok(Arc::new(value.to_string())))
    }

    fn logged_factory(log: &Log, name: &'static str) -> BeanInstructions<String> {
        let log = Arc::clone(log);
        BeanInstructions::new().use_factory(move |_| {
            log.lock().push(name.to_string());
            Ok(Arc::new(name.to_string()))
        })
    }

    fn logged_destroy(log: &Log, name: &'static str, order: i32) -> BeanInstructions<String> {
        let log = Arc::clone(log);
        string_factory(name).destroy_order(order).with_destroy(move |bean: &String| {
            log.lock().push(bean.clone());
            Ok(())
        })
    }

    fn logged_initializer(log: &Log, name: &'static str) -> InitializerInstructions {
        let log = Arc::clone(log);
        InitializerInstructions::use_function(move |_| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name.to_string());
                Ok(())
            }
        })
    }

    // ==================== 注册与查找 ====================

    #[test]
    fn test_get_returns_same_instance() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("name");
        let created = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&created);
        beans
            .register(
                &symbol,
                BeanInstructions::new().use_factory(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new("bean".to_string()))
                }),
            )
            .unwrap();

        // 懒加载：注册时不构造
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let first = beans.get(&symbol).unwrap();
        let second = beans.get(&symbol).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_bean() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("missing");

        assert!(matches!(beans.get(&symbol), Err(BeanError::NullBean { .. })));
        assert!(beans.opt(&symbol).unwrap().is_none());
        assert!(beans.all(&symbol).unwrap().is_empty());
        assert_eq!(*beans.get_or(&symbol, Arc::new("fallback".to_string())).unwrap(), "fallback");
        assert_eq!(*beans.get_or_else(&symbol, || Arc::new("lazy".to_string())).unwrap(), "lazy");
        assert!(!beans.contains(&symbol));
    }

    #[test]
    fn test_empty_values_are_still_beans() {
        let beans = BeanManager::new();
        let zero = Symbol::<u32>::token("zero");
        let empty = Symbol::<String>::token("empty");

        beans.register(&zero, BeanInstructions::new().use_value(Arc::new(0))).unwrap();
        beans.register(&empty, BeanInstructions::new().use_value(Arc::new(String::new()))).unwrap();

        assert_eq!(*beans.get(&zero).unwrap(), 0);
        assert_eq!(*beans.get(&empty).unwrap(), "");
        assert!(beans.opt(&empty).unwrap().is_some());
    }

    #[test]
    fn test_multi_beans_in_registration_order() {
        let beans = BeanManager::new();
        let plugins = Symbol::<String>::token("plugins");

        for name in ["a", "b", "c"] {
            beans.register(&plugins, string_factory(name).multi(true)).unwrap();
        }

        let all: Vec<String> = beans.all(&plugins).unwrap().iter().map(|s| s.to_string()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);
        assert!(matches!(beans.get(&plugins), Err(BeanError::MultiBean { count: 3, .. })));
    }

    #[test]
    fn test_multi_mismatch_is_rejected() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("mixed");

        beans.register(&symbol, string_factory("single")).unwrap();
        let err = beans.register(&symbol, string_factory("multi").multi(true)).unwrap_err();

        assert!(matches!(err, BeanError::MultiMismatch { .. }));
        assert_eq!(*beans.get(&symbol).unwrap(), "single");
    }

    #[test]
    fn test_missing_strategy_is_rejected() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("nothing");

        let err = beans.register(&symbol, BeanInstructions::new().eager(true)).unwrap_err();
        assert!(matches!(err, BeanError::MissingStrategy { .. }));
        assert!(!beans.contains(&symbol));
    }

    #[test]
    fn test_replacing_bean_destroys_previous_instance() {
        let log = new_log();
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("replaced");

        beans.register(&symbol, logged_destroy(&log, "old", 0)).unwrap();
        assert_eq!(*beans.get(&symbol).unwrap(), "old");

        beans.register(&symbol, string_factory("new")).unwrap();
        assert_eq!(*log.lock(), vec!["old"]);
        assert_eq!(*beans.get(&symbol).unwrap(), "new");
    }

    #[test]
    fn test_unregister() {
        let log = new_log();
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("temporary");

        let registration = beans.register(&symbol, logged_destroy(&log, "temporary", 0)).unwrap();
        assert_eq!(registration.symbol(), Some("temporary"));
        assert!(registration.is_registered());

        beans.get(&symbol).unwrap();
        registration.unregister();

        assert!(!beans.contains(&symbol));
        assert_eq!(*log.lock(), vec!["temporary"]);
    }

    #[test]
    fn test_unregister_one_of_multi() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("handlers");

        beans.register(&symbol, string_factory("keep").multi(true)).unwrap();
        let dropped = beans.register(&symbol, string_factory("drop").multi(true)).unwrap();
        dropped.unregister();

        let all: Vec<String> = beans.all(&symbol).unwrap().iter().map(|s| s.to_string()).collect();
        assert_eq!(all, vec!["keep"]);
    }

    #[test]
    fn test_register_if_absent() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("config");

        beans.register(&symbol, string_factory("first")).unwrap();
        let registration = beans.register_if_absent(&symbol, string_factory("second")).unwrap();

        assert!(!registration.is_registered());
        assert_eq!(registration.symbol(), None);
        assert_eq!(*beans.get(&symbol).unwrap(), "first");
    }

    #[test]
    fn test_symbols_lists_registered_names() {
        let beans = BeanManager::new();
        beans.register(&Symbol::<String>::token("b"), string_factory("b")).unwrap();
        beans.register(&Symbol::<String>::token("a"), string_factory("a")).unwrap();

        assert_eq!(beans.symbols(), vec!["a", "b"]);
    }

    // ==================== 组件、别名与装饰器 ====================

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct RawGreeter {
        log: Log,
    }

    impl Component for RawGreeter {
        fn create(beans: &BeanManager) -> Result<Self> {
            Ok(Self {
                log: beans.get(&log_symbol())?,
            })
        }

        fn pre_destroy(&self) -> Result<()> {
            self.log.lock().push("destroy raw".to_string());
            Ok(())
        }
    }

    impl Greeter for RawGreeter {
        fn greet(&self) -> String {
            self.log.lock().push("raw".to_string());
            "raw".to_string()
        }
    }

    struct Prefix {
        name: &'static str,
        log: Log,
    }

    struct Prefixed {
        name: &'static str,
        inner: Arc<dyn Greeter>,
        log: Log,
    }

    impl BeanDecorator<dyn Greeter> for Prefix {
        fn decorate(&self, bean: Arc<dyn Greeter>) -> Arc<dyn Greeter> {
            Arc::new(Prefixed {
                name: self.name,
                inner: bean,
                log: Arc::clone(&self.log),
            })
        }
    }

    impl Greeter for Prefixed {
        fn greet(&self) -> String {
            self.log.lock().push(self.name.to_string());
            format!("{}{}", self.name, self.inner.greet())
        }
    }

    fn prefix(log: &Log, name: &'static str) -> DecoratorInstructions<dyn Greeter> {
        DecoratorInstructions::<dyn Greeter>::use_value(Arc::new(Prefix {
            name,
            log: Arc::clone(log),
        }))
    }

    #[test]
    fn test_decorators_apply_in_registration_order() {
        let log = new_log();
        let beans = BeanManager::new();
        let greeter = Symbol::<dyn Greeter>::token("greeter");

        beans
            .register(&log_symbol(), BeanInstructions::new().use_value(Arc::clone(&log)))
            .unwrap();
        beans
            .register(
                &greeter,
                BeanInstructions::new()
                    .use_class_as::<RawGreeter>(|raw: Arc<RawGreeter>| -> Arc<dyn Greeter> { raw }),
            )
            .unwrap();
        for name in ["d1", "d2", "d3"] {
            beans.register_decorator(&greeter, prefix(&log, name)).unwrap();
        }

        let bean = beans.get(&greeter).unwrap();
        assert_eq!(bean.greet(), "d1d2d3raw");
        assert_eq!(*log.lock(), vec!["d1", "d2", "d3", "raw"]);

        // 销毁回调作用于未装饰的原始实例
        beans.destroy();
        assert_eq!(log.lock().last().map(String::as_str), Some("destroy raw"));
    }

    #[test]
    fn test_alias_is_decorated_independently() {
        let log = new_log();
        let beans = BeanManager::new();
        let target = Symbol::<String>::token("target");
        let alias = Symbol::<String>::token("alias");

        beans.register(&target, logged_destroy(&log, "shared", 0)).unwrap();
        beans
            .register(&alias, BeanInstructions::new().use_existing(target.clone()))
            .unwrap();

        assert!(Arc::ptr_eq(&beans.get(&alias).unwrap(), &beans.get(&target).unwrap()));

        struct Loud;
        impl BeanDecorator<String> for Loud {
            fn decorate(&self, bean: Arc<String>) -> Arc<String> {
                Arc::new(bean.to_uppercase())
            }
        }

        let decorated = Symbol::<String>::token("decorated-alias");
        beans
            .register(&decorated, BeanInstructions::new().use_existing(target.clone()))
            .unwrap();
        beans
            .register_decorator(&decorated, DecoratorInstructions::<String>::use_value(Arc::new(Loud)))
            .unwrap();

        assert_eq!(*beans.get(&decorated).unwrap(), "SHARED");
        assert_eq!(*beans.get(&target).unwrap(), "shared");

        // 别名不拥有实例，目标只销毁一次
        beans.destroy();
        assert_eq!(*log.lock(), vec!["shared"]);
    }

    #[test]
    fn test_replacing_alias_keeps_target_alive() {
        let log = new_log();
        let beans = BeanManager::new();
        let target = Symbol::<String>::token("target");
        let alias = Symbol::<String>::token("alias");

        beans.register(&target, logged_destroy(&log, "shared", 0)).unwrap();
        beans
            .register(&alias, BeanInstructions::new().use_existing(target.clone()))
            .unwrap();
        let shared = beans.get(&alias).unwrap();

        // 替换别名只丢弃别名本身，不触发目标的销毁回调
        beans.register(&alias, string_factory("other")).unwrap();
        assert!(log.lock().is_empty());
        assert_eq!(*beans.get(&alias).unwrap(), "other");
        assert!(Arc::ptr_eq(&beans.get(&target).unwrap(), &shared));

        beans.destroy();
        assert_eq!(*log.lock(), vec!["shared"]);
    }

    #[test]
    fn test_register_component() {
        let log = new_log();
        let beans = BeanManager::new();

        beans
            .register(&log_symbol(), BeanInstructions::new().use_value(Arc::clone(&log)))
            .unwrap();
        beans.register_component::<RawGreeter>().unwrap();

        let greeter = beans.get(&Symbol::<RawGreeter>::of()).unwrap();
        assert_eq!(greeter.greet(), "raw");
    }

    #[test]
    fn test_circular_construction_is_detected() {
        let beans = BeanManager::new();
        let a = Symbol::<String>::token("a");
        let b = Symbol::<String>::token("b");
        let c = Symbol::<String>::token("c");

        let depends_on = |next: &Symbol<String>, name: &'static str| {
            let next = next.clone();
            BeanInstructions::new()
                .use_factory(move |beans: &BeanManager| Ok(Arc::new(format!("{}{}", name, beans.get(&next)?))))
        };

        beans.register(&a, depends_on(&b, "a")).unwrap();
        beans.register(&b, depends_on(&c, "b")).unwrap();
        beans.register(&c, depends_on(&a, "c")).unwrap();

        let err = beans.get(&a).unwrap_err();
        assert!(err.is_circular(), "unexpected error: {err}");

        // 打破循环后可以正常构造
        beans.register(&c, string_factory("c")).unwrap();
        assert_eq!(*beans.get(&a).unwrap(), "abc");
    }

    #[test]
    fn test_factory_error_is_wrapped() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("broken");

        beans
            .register(
                &symbol,
                BeanInstructions::new().use_factory(|_| anyhow::bail!("connection refused")),
            )
            .unwrap();

        let err = beans.get(&symbol).unwrap_err();
        assert!(matches!(err, BeanError::Construction { ref symbol, .. } if symbol == "broken"));

        // 失败不会被缓存
        assert!(beans.get(&symbol).is_err());
    }

    // ==================== 启动 ====================

    #[tokio::test]
    async fn test_eager_beans_constructed_on_start() {
        let log = new_log();
        let beans = BeanManager::new();

        beans.register(&Symbol::token("lazy"), logged_factory(&log, "lazy")).unwrap();
        beans
            .register(&Symbol::token("eager"), logged_factory(&log, "eager").eager(true))
            .unwrap();
        assert!(log.lock().is_empty());

        beans.start(BeanManagerConfig::default()).await.unwrap();
        assert_eq!(*log.lock(), vec!["eager"]);

        // 启动后注册的 eager Bean 立即构造
        beans
            .register(&Symbol::token("late"), logged_factory(&log, "late").eager(true))
            .unwrap();
        assert_eq!(*log.lock(), vec!["eager", "late"]);
    }

    #[tokio::test]
    async fn test_initializers_run_by_runlevel() {
        let log = new_log();
        let beans = BeanManager::new();

        for (name, runlevel) in [("second", 1), ("first", 0), ("third", 2), ("first-b", 0)] {
            beans
                .register_initializer(logged_initializer(&log, name).runlevel(runlevel))
                .unwrap();
        }
        beans
            .register(&Symbol::token("eager"), logged_factory(&log, "eager").eager(true))
            .unwrap();

        beans.start(BeanManagerConfig::default()).await.unwrap();

        assert_eq!(*log.lock(), vec!["first", "first-b", "second", "third", "eager"]);
        assert_eq!(beans.current_runlevel(), Some(3));
        assert!(beans.is_started());
    }

    #[tokio::test]
    async fn test_default_and_eager_runlevel_from_config() {
        let log = new_log();
        let beans = BeanManager::new();

        beans.register_initializer(logged_initializer(&log, "default")).unwrap();
        beans
            .register_initializer(logged_initializer(&log, "zero").runlevel(0))
            .unwrap();
        beans
            .register(&Symbol::token("eager"), logged_factory(&log, "eager").eager(true))
            .unwrap();

        let config = BeanManagerConfig::new()
            .initializer_default_runlevel(2)
            .eager_bean_construct_runlevel(1);
        beans.start(config).await.unwrap();

        assert_eq!(*log.lock(), vec!["zero", "eager", "default"]);
        assert_eq!(beans.current_runlevel(), Some(2));
    }

    #[tokio::test]
    async fn test_initializers_in_same_runlevel_run_concurrently() {
        let beans = BeanManager::new();
        let notify = Arc::new(Notify::new());

        let waiter = Arc::clone(&notify);
        beans
            .register_initializer_fn(move |_| {
                let waiter = Arc::clone(&waiter);
                async move {
                    waiter.notified().await;
                    Ok(())
                }
            })
            .unwrap();
        let notifier = Arc::clone(&notify);
        beans
            .register_initializer_fn(move |_| {
                let notifier = Arc::clone(&notifier);
                async move {
                    notifier.notify_one();
                    Ok(())
                }
            })
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), beans.start(BeanManagerConfig::default()))
            .await
            .expect("initializers in the same runlevel should not block each other")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_runlevel_stops_start() {
        let log = new_log();
        let beans = BeanManager::new();

        beans
            .register_initializer(
                InitializerInstructions::use_function(|_| async { Err::<(), _>(anyhow::anyhow!("boom")) })
                    .runlevel(0),
            )
            .unwrap();
        beans
            .register_initializer(logged_initializer(&log, "same level").runlevel(0))
            .unwrap();
        beans
            .register_initializer(logged_initializer(&log, "never").runlevel(1))
            .unwrap();

        let err = beans.start(BeanManagerConfig::default()).await.unwrap_err();
        assert!(matches!(err, BeanError::Initializer { runlevel: 0, .. }));
        assert_eq!(*log.lock(), vec!["same level"]);
        assert_eq!(beans.phase(), Phase::Failed);

        assert!(matches!(
            beans.start(BeanManagerConfig::default()).await,
            Err(BeanError::Lifecycle(_))
        ));

        beans.destroy();
        assert_eq!(beans.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_failed_eager_bean_fails_start() {
        let beans = BeanManager::new();
        beans
            .register(
                &Symbol::<String>::token("broken"),
                BeanInstructions::new()
                    .use_factory(|_| anyhow::bail!("no database"))
                    .eager(true),
            )
            .unwrap();

        let err = beans.start(BeanManagerConfig::default()).await.unwrap_err();
        assert!(matches!(err, BeanError::Initializer { runlevel: 1, .. }));
    }

    #[tokio::test]
    async fn test_setup_rejected_after_start() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("late");
        beans.start(BeanManagerConfig::default()).await.unwrap();

        assert!(matches!(
            beans.start(BeanManagerConfig::default()).await,
            Err(BeanError::Lifecycle(_))
        ));
        assert!(matches!(
            beans.register_initializer_fn(|_| async { Ok(()) }),
            Err(BeanError::Lifecycle(_))
        ));
        assert!(matches!(
            beans.register_decorator(
                &symbol,
                DecoratorInstructions::<String>::use_factory(|_| anyhow::bail!("unused"))
            ),
            Err(BeanError::Lifecycle(_))
        ));

        // Bean 仍然可以注册
        beans.register(&symbol, string_factory("late")).unwrap();
        assert_eq!(*beans.get(&symbol).unwrap(), "late");
    }

    #[tokio::test]
    async fn test_initializer_can_register_decorators() {
        struct Bang;
        impl BeanDecorator<String> for Bang {
            fn decorate(&self, bean: Arc<String>) -> Arc<String> {
                Arc::new(format!("{}!", bean))
            }
        }

        let beans = BeanManager::new();
        let x = Symbol::<String>::token("x");
        let late_initializer = Arc::new(Mutex::new(None));

        beans.register(&x, string_factory("x").eager(true)).unwrap();

        let symbol = x.clone();
        let outcome = Arc::clone(&late_initializer);
        beans
            .register_initializer(
                InitializerInstructions::use_function(move |beans| {
                    let symbol = symbol.clone();
                    let outcome = Arc::clone(&outcome);
                    async move {
                        beans.register_decorator(&symbol, DecoratorInstructions::<String>::use_value(Arc::new(Bang)))?;
                        *outcome.lock() = Some(beans.register_initializer_fn(|_| async { Ok(()) }));
                        Ok(())
                    }
                })
                .runlevel(0),
            )
            .unwrap();

        beans.start(BeanManagerConfig::default()).await.unwrap();

        // eager Bean 在更高的运行级别构造，已经被装饰
        assert_eq!(*beans.get(&x).unwrap(), "x!");
        // 启动过程中注册的初始化器永远不会运行，直接拒绝
        assert!(matches!(late_initializer.lock().take(), Some(Err(BeanError::Lifecycle(_)))));
    }

    #[tokio::test]
    async fn test_next_runlevel_waits_for_suspended_initializer() {
        let log = new_log();
        let beans = BeanManager::new();
        let ready = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ready);
        let slow_log = Arc::clone(&log);
        beans
            .register_initializer(
                InitializerInstructions::use_function(move |_| {
                    let flag = Arc::clone(&flag);
                    let log = Arc::clone(&slow_log);
                    async move {
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        log.lock().push("slow".to_string());
                        flag.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .runlevel(0),
            )
            .unwrap();

        let flag = Arc::clone(&ready);
        let check_log = Arc::clone(&log);
        beans
            .register_initializer(
                InitializerInstructions::use_function(move |_| {
                    let flag = Arc::clone(&flag);
                    let log = Arc::clone(&check_log);
                    async move {
                        if !flag.load(Ordering::SeqCst) {
                            anyhow::bail!("runlevel 1 started before runlevel 0 finished");
                        }
                        log.lock().push("check".to_string());
                        Ok(())
                    }
                })
                .runlevel(1),
            )
            .unwrap();

        beans.start(BeanManagerConfig::default()).await.unwrap();
        assert_eq!(*log.lock(), vec!["slow", "check"]);
    }

    struct Warmup {
        log: Log,
    }

    impl Component for Warmup {
        fn create(beans: &BeanManager) -> Result<Self> {
            Ok(Self {
                log: beans.get(&log_symbol())?,
            })
        }
    }

    #[async_trait::async_trait]
    impl Initializer for Warmup {
        async fn init(&self) -> Result<()> {
            self.log.lock().push("warmup".to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_class_and_existing_initializers() {
        let log = new_log();
        let beans = BeanManager::new();

        beans
            .register(&log_symbol(), BeanInstructions::new().use_value(Arc::clone(&log)))
            .unwrap();
        beans.register_component::<Warmup>().unwrap();
        beans
            .register_initializer(InitializerInstructions::use_class::<Warmup>())
            .unwrap();
        beans
            .register_initializer(InitializerInstructions::use_existing(Symbol::<Warmup>::of()).runlevel(1))
            .unwrap();

        beans.start(BeanManagerConfig::default()).await.unwrap();
        assert_eq!(*log.lock(), vec!["warmup", "warmup"]);
    }

    #[tokio::test]
    async fn test_when_runlevel() {
        let beans = BeanManager::new();
        let observed = new_log();

        let early = beans.when_runlevel(1);
        assert!(beans.when_runlevel(0).now_or_never().is_none());

        let log = Arc::clone(&observed);
        beans
            .register_initializer(
                InitializerInstructions::use_function(move |beans: BeanManager| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(format!("{:?}", beans.current_runlevel()));
                        assert!(beans.when_runlevel(1).now_or_never().is_some());
                        assert!(beans.when_runlevel(2).now_or_never().is_none());
                        Ok(())
                    }
                })
                .runlevel(1),
            )
            .unwrap();

        beans.start(BeanManagerConfig::default()).await.unwrap();
        early.await;
        beans.when_runlevel(2).await;

        assert_eq!(*observed.lock(), vec!["Some(1)"]);
    }

    // ==================== 销毁 ====================

    #[test]
    fn test_destroy_order() {
        let log = new_log();
        let beans = BeanManager::new();

        let symbols: Vec<Symbol<String>> = [("bean1", 0), ("bean2", 4), ("bean3", 3), ("bean4", 2)]
            .into_iter()
            .map(|(name, order)| {
                let symbol = Symbol::token(name);
                beans.register(&symbol, logged_destroy(&log, name, order)).unwrap();
                symbol
            })
            .collect();
        for symbol in &symbols {
            beans.get(symbol).unwrap();
        }

        beans.destroy();
        assert_eq!(*log.lock(), vec!["bean1", "bean4", "bean3", "bean2"]);
    }

    #[tokio::test]
    async fn test_eager_destroy_order_after_start() {
        let log = new_log();
        let beans = BeanManager::new();

        for (name, order) in [("bean1", 0), ("bean2", 4), ("bean3", 3), ("bean4", 2)] {
            beans
                .register(&Symbol::<String>::token(name), logged_destroy(&log, name, order).eager(true))
                .unwrap();
        }

        beans.start(BeanManagerConfig::default()).await.unwrap();
        assert!(log.lock().is_empty());

        beans.destroy();
        assert_eq!(*log.lock(), vec!["bean1", "bean4", "bean3", "bean2"]);
    }

    #[test]
    fn test_equal_order_destroys_in_reverse_construction_order() {
        let log = new_log();
        let beans = BeanManager::new();

        let x = Symbol::<String>::token("x");
        let y = Symbol::<String>::token("y");
        let z = Symbol::<String>::token("z");
        let unused = Symbol::<String>::token("unused");
        for (symbol, name) in [(&x, "x"), (&y, "y"), (&z, "z"), (&unused, "unused")] {
            beans.register(symbol, logged_destroy(&log, name, 0)).unwrap();
        }

        beans.get(&z).unwrap();
        beans.get(&x).unwrap();
        beans.get(&y).unwrap();

        beans.destroy();
        assert_eq!(*log.lock(), vec!["y", "x", "z"]);
        assert!(beans.symbols().is_empty());
    }

    #[test]
    fn test_failing_destroy_hooks_do_not_block_others() {
        let log = new_log();
        let beans = BeanManager::new();
        let failing = Symbol::<String>::token("failing");
        let panicking = Symbol::<String>::token("panicking");
        let healthy = Symbol::<String>::token("healthy");

        beans
            .register(&failing, string_factory("failing").with_destroy(|_| anyhow::bail!("close failed")))
            .unwrap();
        beans
            .register(
                &panicking,
                string_factory("panicking")
                    .destroy_order(1)
                    .with_destroy(|_: &String| -> Result<()> { panic!("destroy panicked") }),
            )
            .unwrap();
        beans.register(&healthy, logged_destroy(&log, "healthy", 2)).unwrap();

        for symbol in [&failing, &panicking, &healthy] {
            beans.get(symbol).unwrap();
        }

        beans.destroy();
        assert_eq!(*log.lock(), vec!["healthy"]);
    }

    #[tokio::test]
    async fn test_restart_after_destroy() {
        let beans = BeanManager::new();
        let symbol = Symbol::<String>::token("service");

        beans.register(&symbol, string_factory("v1").eager(true)).unwrap();
        beans.start(BeanManagerConfig::default()).await.unwrap();

        beans.destroy();
        assert!(!beans.contains(&symbol));
        assert_eq!(beans.current_runlevel(), None);
        assert!(!beans.is_started());

        beans.register(&symbol, string_factory("v2")).unwrap();
        beans.start(BeanManagerConfig::default()).await.unwrap();
        assert_eq!(*beans.get(&symbol).unwrap(), "v2");
    }
}
