use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::load_balancer::{Instance, Registry, Selector};
use crate::metrics::StrategyMetrics;
use crate::table::InstanceTable;

const NAME: &str = "dynamic_weighted";

/// 剩余计数等于它时表示已删除
const TOMBSTONE: i64 = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Live(i64),
    Tombstoned,
}

/// 队列节点：实例 + 本轮剩余次数
///
/// 读写都发生在队列锁内，原子类型只是为了能通过 `Arc` 在映射表和队列间共享。
#[derive(Debug)]
struct InstanceWrapper<I> {
    instance: I,
    remaining: AtomicI64,
}

impl<I: Instance> InstanceWrapper<I> {
    fn new(instance: I) -> Self {
        let remaining = refill_weight(&instance);
        Self {
            instance,
            remaining: AtomicI64::new(remaining),
        }
    }

    fn slot(&self) -> Slot {
        match self.remaining.load(Ordering::Relaxed) {
            TOMBSTONE => Slot::Tombstoned,
            n => Slot::Live(n),
        }
    }

    fn set_remaining(&self, n: i64) {
        self.remaining.store(n, Ordering::Relaxed);
    }

    fn tombstone(&self) {
        self.remaining.store(TOMBSTONE, Ordering::Relaxed);
    }
}

/// 读取实例当前权重，非正数按 1 处理，否则计数永远减不到 0
fn refill_weight<I: Instance>(instance: &I) -> i64 {
    let weight = instance.instance_weight();
    if weight < 1 {
        warn!(strategy = NAME, weight, "non-positive weight treated as 1");
        return 1;
    }
    weight
}

#[derive(Debug)]
struct QueuePair<I> {
    main: VecDeque<Arc<InstanceWrapper<I>>>,
    secondary: VecDeque<Arc<InstanceWrapper<I>>>,
}

impl<I> QueuePair<I> {
    /// 从主队列出队；主队列空而副队列非空时交换两者
    fn pop(&mut self) -> Option<Arc<InstanceWrapper<I>>> {
        if self.main.is_empty() {
            std::mem::swap(&mut self.main, &mut self.secondary);
        }
        self.main.pop_front()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.main.len() + self.secondary.len()
    }
}

/// 双队列动态加权负载均衡
///
/// 每个实例按权重 W 在一轮中被选中 W 次：节点出队后剩余次数减一，
/// 未用完放回主队列尾部，用完则按当前权重重置并放入副队列；
/// 主队列耗尽即一轮结束，两个队列交换。
/// 删除只给节点打墓碑，节点在下次出队时才被丢弃，因此增删选都是 O(1)。
///
/// 所有队列操作共用一把互斥锁。
pub struct DynamicWeighted<I: Instance> {
    table: InstanceTable<I::Id, Arc<InstanceWrapper<I>>>,
    queues: Mutex<QueuePair<I>>,
    metrics: StrategyMetrics,
}

impl<I> DynamicWeighted<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self {
            table: InstanceTable::new(),
            queues: Mutex::new(QueuePair {
                main: VecDeque::with_capacity(8),
                secondary: VecDeque::with_capacity(8),
            }),
            metrics: StrategyMetrics::new(NAME),
        }
    }
}

impl<I> Default for DynamicWeighted<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for DynamicWeighted<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let mut queues = self.queues.lock();
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            if self.table.contains(&id) {
                continue;
            }
            let wrapper = Arc::new(InstanceWrapper::new(instance.clone()));
            if self.table.insert_if_absent(id, Arc::clone(&wrapper)) {
                queues.main.push_back(wrapper);
                count += 1;
            }
        }
        drop(queues);

        self.metrics.added(count);
        debug!(strategy = NAME, added = count, size = self.table.len(), "instances added");
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let queues = self.queues.lock();
        let mut count = 0;
        for instance in instances {
            if let Some(wrapper) = self.table.remove(&instance.instance_id()) {
                wrapper.tombstone();
                count += 1;
            }
        }
        drop(queues);

        self.metrics.removed(count);
        debug!(strategy = NAME, removed = count, size = self.table.len(), "instances removed");
        count
    }

    fn get(&self, id: &I::Id) -> Option<I> {
        self.table.get(id).map(|w| w.instance.clone())
    }

    fn size(&self) -> usize {
        self.table.len()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&I::Id, &I) -> bool) {
        self.table.for_each(|id, wrapper| visit(id, &wrapper.instance));
    }
}

impl<I> Selector<I> for DynamicWeighted<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select(&self) -> Option<I> {
        let mut queues = self.queues.lock();
        let selected = loop {
            let Some(wrapper) = queues.pop() else {
                break None;
            };
            let remaining = match wrapper.slot() {
                // 已删除的节点不再入队，随 Arc 一起释放
                Slot::Tombstoned => continue,
                Slot::Live(n) => n - 1,
            };
            let instance = wrapper.instance.clone();
            if remaining <= 0 {
                wrapper.set_remaining(refill_weight(&wrapper.instance));
                queues.secondary.push_back(wrapper);
            } else {
                wrapper.set_remaining(remaining);
                queues.main.push_back(wrapper);
            }
            break Some(instance);
        };
        drop(queues);

        if selected.is_none() {
            trace!(strategy = NAME, "select on empty set");
        }
        self.metrics.observe(selected)
    }
}
