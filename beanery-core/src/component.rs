use crate::error::Result;
use crate::manager::BeanManager;

/// Component trait - 可以由容器直接构造的类型（对应 `use_class` 策略）
///
/// `create` 中可以通过 `beans` 查找其它 Bean，依赖关系就是这样解析的；
/// 循环依赖由管理器检测，不会导致栈溢出。
///
/// # 示例
///
/// ```
/// use beanery_core::prelude::*;
/// use std::sync::Arc;
///
/// struct Database;
///
/// impl Component for Database {
///     fn create(_beans: &BeanManager) -> anyhow::Result<Self> {
///         Ok(Database)
///     }
/// }
///
/// struct UserService {
///     db: Arc<Database>,
/// }
///
/// impl Component for UserService {
///     fn create(beans: &BeanManager) -> anyhow::Result<Self> {
///         Ok(UserService {
///             db: beans.get(&Symbol::<Database>::of())?,
///         })
///     }
/// }
///
/// let beans = BeanManager::new();
/// beans.register_component::<Database>().unwrap();
/// beans.register_component::<UserService>().unwrap();
///
/// let service = beans.get(&Symbol::<UserService>::of()).unwrap();
/// assert!(Arc::ptr_eq(&service.db, &beans.get(&Symbol::<Database>::of()).unwrap()));
/// ```
pub trait Component: Sized + Send + Sync + 'static {
    /// 构造实例
    fn create(beans: &BeanManager) -> Result<Self>;

    /// 销毁回调（类似 @PreDestroy）
    ///
    /// 在管理器丢弃该实例之前调用一次，默认什么都不做
    fn pre_destroy(&self) -> Result<()> {
        Ok(())
    }
}
