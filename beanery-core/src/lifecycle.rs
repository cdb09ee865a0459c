use crate::error::Result;

/// 销毁回调 trait（类似 @PreDestroy）
///
/// 通过 [`BeanInstructions::destroyable`](crate::BeanInstructions::destroyable)
/// 接入；`T` 可以是 trait object。
pub trait PreDestroy: Send + Sync {
    fn pre_destroy(&self) -> Result<()>;
}

/// 管理器的生命周期阶段
///
/// `Idle -> Starting -> Started`；某个运行级别失败时进入 `Failed`。
/// `destroy()` 会把任意阶段重置回 `Idle`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// 正在按运行级别执行初始化器
    Starting,
    Started,
    /// 初始化器失败，需要先 destroy() 才能再次启动
    Failed,
}

impl Phase {
    /// 装饰器在启动过程中仍可注册，之后首次构造的 bean 会被装饰
    pub fn accepts_decorators(self) -> bool {
        matches!(self, Phase::Idle | Phase::Starting)
    }

    /// 初始化器在 start() 时一次性取出，启动开始后注册的不会再运行
    pub fn accepts_initializers(self) -> bool {
        self == Phase::Idle
    }
}

/// 按销毁顺序排序
///
/// 先按 destroy order 升序；相同 order 时按构造序号降序（后构造的先销毁）。
/// 从未构造的条目（没有构造序号）排在同一 order 的最后。
pub(crate) fn sort_for_destroy<E, F>(entries: &mut [E], key: F)
where
    F: Fn(&E) -> (i32, Option<u64>),
{
    entries.sort_by(|a, b| {
        let (order_a, seq_a) = key(a);
        let (order_b, seq_b) = key(b);
        order_a.cmp(&order_b).then_with(|| seq_b.cmp(&seq_a))
    });
}
