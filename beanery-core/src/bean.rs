//! Bean 注册说明与注册表条目
//!
//! [`BeanInstructions`] 描述如何构造一个 Bean；注册时被校验并擦除类型，
//! 变成注册表中的 [`BeanEntry`]。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::Component;
use crate::error::{BeanError, BeanResult, Result};
use crate::lifecycle::PreDestroy;
use crate::manager::BeanManager;
use crate::symbol::{Symbol, SymbolKey};

/// 擦除类型后的 Bean，内部保存的是 `Arc<T>`
pub type ErasedBean = Arc<dyn Any + Send + Sync>;

/// 工厂函数类型
pub type FactoryFn<T> = Arc<dyn Fn(&BeanManager) -> Result<Arc<T>> + Send + Sync>;

/// 类构造函数类型，同时返回绑定到该实例的销毁回调
pub type ClassFn<T> = Arc<dyn Fn(&BeanManager) -> Result<(Arc<T>, PreDestroyHook)> + Send + Sync>;

/// 销毁回调类型
pub type DestroyCallback<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// 已绑定到某个实例的销毁回调，只会被调用一次
pub type PreDestroyHook = Box<dyn FnOnce() -> Result<()> + Send>;

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(bean: Arc<T>) -> ErasedBean {
    Arc::new(bean)
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(
    bean: &ErasedBean,
    symbol: &SymbolKey,
) -> BeanResult<Arc<T>> {
    bean.downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| BeanError::TypeMismatch {
            symbol: symbol.name().to_string(),
            expected: std::any::type_name::<T>(),
        })
}

/// 构造策略的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Value,
    Class,
    Factory,
    Existing,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::Value => "use_value",
            StrategyKind::Class => "use_class",
            StrategyKind::Factory => "use_factory",
            StrategyKind::Existing => "use_existing",
        }
    }

    /// 只有由管理器自己创建的实例才会调用销毁回调
    pub fn owns_instance(self) -> bool {
        matches!(self, StrategyKind::Class | StrategyKind::Factory)
    }
}

/// 构造策略
pub enum Construct<T: ?Sized> {
    /// 已经存在的值
    Value(Arc<T>),
    /// 由 [`Component`] 构造
    Class(ClassFn<T>),
    /// 由工厂函数构造
    Factory(FactoryFn<T>),
    /// 指向另一个 Symbol 的别名
    Existing(Symbol<T>),
}

impl<T: ?Sized> Construct<T> {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Construct::Value(_) => StrategyKind::Value,
            Construct::Class(_) => StrategyKind::Class,
            Construct::Factory(_) => StrategyKind::Factory,
            Construct::Existing(_) => StrategyKind::Existing,
        }
    }
}

impl<T: ?Sized> Clone for Construct<T> {
    fn clone(&self) -> Self {
        match self {
            Construct::Value(value) => Construct::Value(Arc::clone(value)),
            Construct::Class(ctor) => Construct::Class(Arc::clone(ctor)),
            Construct::Factory(factory) => Construct::Factory(Arc::clone(factory)),
            Construct::Existing(symbol) => Construct::Existing(symbol.clone()),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Construct<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construct::Existing(symbol) => f.debug_tuple("Existing").field(symbol).finish(),
            other => f.write_str(other.kind().name()),
        }
    }
}

pub(crate) fn class_fn<C, T, U>(upcast: U) -> ClassFn<T>
where
    C: Component,
    T: ?Sized + Send + Sync + 'static,
    U: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
{
    Arc::new(move |beans: &BeanManager| -> Result<(Arc<T>, PreDestroyHook)> {
        let component = Arc::new(C::create(beans)?);
        let target = Arc::clone(&component);
        let hook: PreDestroyHook = Box::new(move || <C as Component>::pre_destroy(&target));
        Ok((upcast(component), hook))
    })
}

/// Bean 注册说明
///
/// 必须且只能设置一个构造策略，重复设置会在注册时报错。
///
/// ```
/// use beanery_core::{BeanInstructions, BeanManager, Symbol};
/// use std::sync::Arc;
///
/// let beans = BeanManager::new();
/// let port = Symbol::<u16>::token("port");
///
/// beans
///     .register(&port, BeanInstructions::new().use_value(Arc::new(8080)))
///     .unwrap();
/// assert_eq!(*beans.get(&port).unwrap(), 8080);
/// ```
pub struct BeanInstructions<T: ?Sized> {
    strategy: Option<Construct<T>>,
    strategies: Vec<&'static str>,
    eager: bool,
    multi: bool,
    destroy_order: i32,
    destroy: Option<DestroyCallback<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> BeanInstructions<T> {
    pub fn new() -> Self {
        Self {
            strategy: None,
            strategies: Vec::new(),
            eager: false,
            multi: false,
            destroy_order: 0,
            destroy: None,
        }
    }

    /// 设置构造策略
    pub fn strategy(mut self, strategy: Construct<T>) -> Self {
        self.strategies.push(strategy.kind().name());
        self.strategy = Some(strategy);
        self
    }

    /// 使用已经存在的值（隐式 eager）
    pub fn use_value(self, value: Arc<T>) -> Self {
        self.strategy(Construct::Value(value))
    }

    /// 使用 [`Component`] 构造，`C` 与 `T` 为同一类型
    pub fn use_class<C>(self) -> Self
    where
        C: Component,
        Arc<C>: Into<Arc<T>>,
    {
        self.strategy(Construct::Class(class_fn::<C, T, _>(|component: Arc<C>| {
            component.into()
        })))
    }

    /// 使用 [`Component`] 构造，并转换为 `T`（通常是 trait object）
    pub fn use_class_as<C>(self, upcast: fn(Arc<C>) -> Arc<T>) -> Self
    where
        C: Component,
    {
        self.strategy(Construct::Class(class_fn::<C, T, _>(upcast)))
    }

    /// 使用工厂函数构造
    pub fn use_factory<F>(self, factory: F) -> Self
    where
        F: Fn(&BeanManager) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.strategy(Construct::Factory(Arc::new(factory)))
    }

    /// 作为另一个 Symbol 的别名
    pub fn use_existing(self, symbol: Symbol<T>) -> Self {
        self.strategy(Construct::Existing(symbol))
    }

    /// 启动时立即构造，而不是第一次查找时
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// 允许同一个 Symbol 下存在多个 Bean
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// 销毁顺序，值越小越先销毁
    pub fn destroy_order(mut self, order: i32) -> Self {
        self.destroy_order = order;
        self
    }

    /// 设置销毁回调（类似 @PreDestroy）
    ///
    /// 只对 `use_class` 和 `use_factory` 生效；对 `use_class` 会替换组件自身的回调。
    pub fn with_destroy<F>(mut self, destroy_fn: F) -> Self
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.destroy = Some(Arc::new(destroy_fn));
        self
    }

    /// 使用 `T` 自身的 [`PreDestroy`] 实现作为销毁回调
    pub fn destroyable(self) -> Self
    where
        T: PreDestroy,
    {
        self.with_destroy(|bean: &T| PreDestroy::pre_destroy(bean))
    }

    pub(crate) fn has_strategy(&self) -> bool {
        !self.strategies.is_empty()
    }

    /// 校验并擦除类型
    pub(crate) fn into_entry(self, symbol: SymbolKey, registration_seq: u64) -> BeanResult<BeanEntry> {
        if self.strategies.len() > 1 {
            return Err(BeanError::AmbiguousStrategy {
                symbol: symbol.name().to_string(),
                strategies: self.strategies,
            });
        }

        let strategy = self.strategy.ok_or_else(|| BeanError::MissingStrategy {
            symbol: symbol.name().to_string(),
        })?;

        let kind = strategy.kind();
        let destroy = self.destroy;
        let construct: ConstructFn = match strategy {
            Construct::Value(value) => Box::new(move |_: &BeanManager| -> Result<Constructed> {
                Ok(Constructed {
                    bean: erase(Arc::clone(&value)),
                    hook: None,
                })
            }),
            Construct::Class(ctor) => Box::new(move |beans: &BeanManager| -> Result<Constructed> {
                let (bean, own_hook) = ctor(beans)?;
                let hook = match &destroy {
                    Some(destroy_fn) => bind_destroy(destroy_fn, &bean),
                    None => own_hook,
                };
                Ok(Constructed {
                    bean: erase(bean),
                    hook: Some(hook),
                })
            }),
            Construct::Factory(factory) => Box::new(move |beans: &BeanManager| -> Result<Constructed> {
                let bean = factory(beans)?;
                let hook = destroy.as_ref().map(|destroy_fn| bind_destroy(destroy_fn, &bean));
                Ok(Constructed {
                    bean: erase(bean),
                    hook,
                })
            }),
            Construct::Existing(alias) => Box::new(move |beans: &BeanManager| -> Result<Constructed> {
                let bean = beans.get(&alias)?;
                Ok(Constructed {
                    bean: erase(bean),
                    hook: None,
                })
            }),
        };

        Ok(BeanEntry {
            symbol,
            kind,
            eager: self.eager || kind == StrategyKind::Value,
            multi: self.multi,
            destroy_order: self.destroy_order,
            registration_seq,
            construct,
            state: Mutex::new(EntryState::default()),
        })
    }
}

impl<T: ?Sized + Send + Sync + 'static> Default for BeanInstructions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for BeanInstructions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanInstructions")
            .field("strategies", &self.strategies)
            .field("eager", &self.eager)
            .field("multi", &self.multi)
            .field("destroy_order", &self.destroy_order)
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

fn bind_destroy<T>(destroy_fn: &DestroyCallback<T>, bean: &Arc<T>) -> PreDestroyHook
where
    T: ?Sized + Send + Sync + 'static,
{
    let destroy_fn = Arc::clone(destroy_fn);
    let bean = Arc::clone(bean);
    Box::new(move || destroy_fn(&bean))
}

/// 构造结果：未装饰的实例及其销毁回调
pub(crate) struct Constructed {
    pub bean: ErasedBean,
    pub hook: Option<PreDestroyHook>,
}

type ConstructFn = Box<dyn Fn(&BeanManager) -> Result<Constructed> + Send + Sync>;

#[derive(Default)]
struct EntryState {
    instance: Option<ErasedBean>,
    hook: Option<PreDestroyHook>,
    constructing: bool,
    construction_seq: Option<u64>,
}

/// 注册表中的一条 Bean 注册
pub(crate) struct BeanEntry {
    pub symbol: SymbolKey,
    pub kind: StrategyKind,
    pub eager: bool,
    pub multi: bool,
    pub destroy_order: i32,
    pub registration_seq: u64,
    construct: ConstructFn,
    state: Mutex<EntryState>,
}

impl BeanEntry {
    /// 已缓存的实例
    pub fn instance(&self) -> Option<ErasedBean> {
        self.state.lock().instance.clone()
    }

    pub fn is_constructing(&self) -> bool {
        self.state.lock().constructing
    }

    pub fn construction_seq(&self) -> Option<u64> {
        self.state.lock().construction_seq
    }

    /// 标记为正在构造；已经在构造中说明出现了循环
    pub fn begin_construction(&self) -> BeanResult<ConstructionGuard<'_>> {
        let mut state = self.state.lock();
        if state.constructing {
            return Err(BeanError::CircularConstruction {
                symbol: self.symbol.name().to_string(),
            });
        }
        state.constructing = true;
        Ok(ConstructionGuard { entry: self })
    }

    /// 执行构造策略，调用期间不持有任何锁
    pub fn construct(&self, beans: &BeanManager) -> Result<Constructed> {
        (self.construct)(beans)
    }

    pub fn complete(&self, instance: ErasedBean, hook: Option<PreDestroyHook>, construction_seq: u64) {
        let mut state = self.state.lock();
        state.instance = Some(instance);
        state.hook = hook;
        state.construction_seq = Some(construction_seq);
    }

    /// 释放实例，返回需要调用的销毁回调
    ///
    /// 只有实际构造过、且实例归本条目所有时才返回回调。
    pub fn release(&self) -> Option<PreDestroyHook> {
        let mut state = self.state.lock();
        let constructed = state.instance.take().is_some();
        state.constructing = false;
        state.construction_seq = None;
        let hook = state.hook.take();
        if constructed && self.kind.owns_instance() {
            hook
        } else {
            None
        }
    }
}

impl fmt::Debug for BeanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BeanEntry")
            .field("symbol", &self.symbol)
            .field("kind", &self.kind)
            .field("eager", &self.eager)
            .field("multi", &self.multi)
            .field("destroy_order", &self.destroy_order)
            .field("constructed", &state.instance.is_some())
            .field("constructing", &state.constructing)
            .finish()
    }
}

/// 在任何退出路径上清除 constructing 标记
pub(crate) struct ConstructionGuard<'a> {
    entry: &'a BeanEntry,
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        self.entry.state.lock().constructing = false;
    }
}
