//! Bean 装饰器
//!
//! 装饰器在 Bean 构造时包装原始实例。同一个 Symbol 上的装饰器按注册顺序保存，
//! 应用时从后往前折叠，所以第一个注册的装饰器在最外层，
//! 方法调用时各装饰器按注册顺序依次执行。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::bean::{downcast, erase, ErasedBean};
use crate::component::Component;
use crate::error::{BeanError, BeanResult, Result};
use crate::manager::BeanManager;
use crate::symbol::SymbolKey;

/// 装饰器 trait
///
/// 每次构造被装饰的 Bean 时调用一次
pub trait BeanDecorator<T: ?Sized>: Send + Sync {
    fn decorate(&self, bean: Arc<T>) -> Arc<T>;
}

type DecoratorFactory<T> = Arc<dyn Fn(&BeanManager) -> Result<Arc<dyn BeanDecorator<T>>> + Send + Sync>;

/// 装饰器的构造策略
pub enum DecoratorInstructions<T: ?Sized> {
    Value(Arc<dyn BeanDecorator<T>>),
    Class(DecoratorFactory<T>),
    Factory(DecoratorFactory<T>),
}

impl<T: ?Sized + Send + Sync + 'static> DecoratorInstructions<T> {
    pub fn use_value(decorator: Arc<dyn BeanDecorator<T>>) -> Self {
        DecoratorInstructions::Value(decorator)
    }

    pub fn use_class<C>() -> Self
    where
        C: Component + BeanDecorator<T>,
    {
        DecoratorInstructions::Class(Arc::new(|beans: &BeanManager| -> Result<Arc<dyn BeanDecorator<T>>> {
            let decorator: Arc<dyn BeanDecorator<T>> = Arc::new(C::create(beans)?);
            Ok(decorator)
        }))
    }

    pub fn use_factory<F>(factory: F) -> Self
    where
        F: Fn(&BeanManager) -> Result<Arc<dyn BeanDecorator<T>>> + Send + Sync + 'static,
    {
        DecoratorInstructions::Factory(Arc::new(factory))
    }

    pub(crate) fn into_entry(self, symbol: SymbolKey) -> DecoratorEntry {
        let cached = match &self {
            DecoratorInstructions::Value(decorator) => Some(Arc::clone(decorator)),
            _ => None,
        };
        DecoratorEntry {
            inner: Box::new(TypedDecorator {
                symbol,
                instructions: self,
                instance: Mutex::new(cached),
            }),
        }
    }
}

/// 注册表中的一条装饰器注册
pub(crate) struct DecoratorEntry {
    inner: Box<dyn ErasedDecorator>,
}

impl DecoratorEntry {
    /// 确保装饰器实例已构造
    pub fn prepare(&self, beans: &BeanManager) -> BeanResult<()> {
        self.inner.prepare(beans)
    }

    pub fn apply(&self, beans: &BeanManager, bean: ErasedBean) -> BeanResult<ErasedBean> {
        self.inner.apply(beans, bean)
    }
}

trait ErasedDecorator: Send + Sync {
    fn prepare(&self, beans: &BeanManager) -> BeanResult<()>;

    fn apply(&self, beans: &BeanManager, bean: ErasedBean) -> BeanResult<ErasedBean>;
}

struct TypedDecorator<T: ?Sized> {
    symbol: SymbolKey,
    instructions: DecoratorInstructions<T>,
    instance: Mutex<Option<Arc<dyn BeanDecorator<T>>>>,
}

impl<T: ?Sized + Send + Sync + 'static> TypedDecorator<T> {
    fn instance(&self, beans: &BeanManager) -> BeanResult<Arc<dyn BeanDecorator<T>>> {
        if let Some(decorator) = self.instance.lock().as_ref() {
            return Ok(Arc::clone(decorator));
        }

        // 构造时不持锁，工厂可能会查找其它 Bean
        let decorator = match &self.instructions {
            DecoratorInstructions::Value(decorator) => Arc::clone(decorator),
            DecoratorInstructions::Class(factory) | DecoratorInstructions::Factory(factory) => {
                factory(beans).map_err(|e| {
                    BeanError::from_construction(&format!("decorator of {}", self.symbol), e)
                })?
            }
        };

        tracing::trace!("Decorator for bean '{}' constructed", self.symbol);
        let mut instance = self.instance.lock();
        Ok(Arc::clone(instance.get_or_insert(decorator)))
    }
}

impl<T: ?Sized + Send + Sync + 'static> ErasedDecorator for TypedDecorator<T> {
    fn prepare(&self, beans: &BeanManager) -> BeanResult<()> {
        self.instance(beans).map(|_| ())
    }

    fn apply(&self, beans: &BeanManager, bean: ErasedBean) -> BeanResult<ErasedBean> {
        let decorator = self.instance(beans)?;
        let bean = downcast::<T>(&bean, &self.symbol)?;
        Ok(erase(decorator.decorate(bean)))
    }
}
