//! Symbol - Bean 的查找键
//!
//! Symbol 只按身份比较：类型形式的 Symbol 以 `TypeId` 为身份，
//! 令牌形式的 Symbol 每次创建都会分配新的身份。名称只用于诊断信息。

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Symbol 的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolId {
    /// 以类型为键（类似“类引用”）
    Type(TypeId),
    /// 不透明令牌
    Token(u64),
}

/// 擦除类型后的 Symbol，用作注册表的键
#[derive(Clone)]
pub struct SymbolKey {
    id: SymbolId,
    name: Arc<str>,
}

impl SymbolKey {
    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for SymbolKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SymbolKey {}

impl Hash for SymbolKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 带类型的查找键，`T` 是通过该键取到的 Bean 类型（`Arc<T>`）
///
/// ```
/// use beanery_core::Symbol;
///
/// trait Greeter: Send + Sync {}
///
/// // 类型形式：每次调用得到相同的键
/// assert_eq!(Symbol::<String>::of(), Symbol::<String>::of());
///
/// // 令牌形式：每个令牌都是唯一的
/// let a = Symbol::<dyn Greeter>::token("greeter");
/// let b = Symbol::<dyn Greeter>::token("greeter");
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// ```
pub struct Symbol<T: ?Sized> {
    key: SymbolKey,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + 'static> Symbol<T> {
    /// 以类型 `T` 本身作为键
    pub fn of() -> Self {
        Self {
            key: SymbolKey {
                id: SymbolId::Type(TypeId::of::<T>()),
                name: Arc::from(std::any::type_name::<T>()),
            },
            _marker: PhantomData,
        }
    }

    /// 创建新的不透明令牌
    pub fn token(name: impl Into<String>) -> Self {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        Self {
            key: SymbolKey {
                id: SymbolId::Token(token),
                name: Arc::from(name.into()),
            },
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Symbol<T> {
    pub fn key(&self) -> &SymbolKey {
        &self.key
    }

    pub fn id(&self) -> SymbolId {
        self.key.id
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }
}

impl<T: ?Sized> Clone for Symbol<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> PartialEq for Symbol<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: ?Sized> Eq for Symbol<T> {}

impl<T: ?Sized> Hash for Symbol<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Symbol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Symbol").field(&self.key.name).finish()
    }
}

impl<T: ?Sized> fmt::Display for Symbol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
