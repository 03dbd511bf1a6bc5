use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::hash::hash_str;
use crate::load_balancer::{Instance, Registry, SelectorBy};
use crate::metrics::StrategyMetrics;
use crate::table::InstanceTable;

const NAME: &str = "source_address_hash";

/// 源地址哈希：`hash(key) % len` 直接下标到按插入顺序排列的列表
///
/// 比一致性哈希简单，但不保证最小重映射：列表长度或顺序一变，
/// 大部分 key 都可能换到别的实例上。需要稳定映射时用 [`ConsistentHash`]。
///
/// [`ConsistentHash`]: crate::load_balancer::ConsistentHash
pub struct SourceAddressHash<I: Instance> {
    table: InstanceTable<I::Id, I>,
    instances: ArcSwap<Vec<I>>,
    writer: Mutex<()>,
    metrics: StrategyMetrics,
}

impl<I> SourceAddressHash<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self {
            table: InstanceTable::new(),
            instances: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
            metrics: StrategyMetrics::new(NAME),
        }
    }

    /// 获取当前实例列表
    pub fn instances(&self) -> Arc<Vec<I>> {
        self.instances.load_full()
    }
}

impl<I> Default for SourceAddressHash<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for SourceAddressHash<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let _guard = self.writer.lock();
        let mut list = Vec::clone(&self.instances.load());
        let mut count = 0;
        for instance in instances {
            if self.table.insert_if_absent(instance.instance_id(), instance.clone()) {
                list.push(instance.clone());
                count += 1;
            }
        }
        if count > 0 {
            let size = list.len();
            self.instances.store(Arc::new(list));
            debug!(strategy = NAME, added = count, size, "instances added");
        }
        self.metrics.added(count);
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let _guard = self.writer.lock();
        let mut list = Vec::clone(&self.instances.load());
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            // 只有存在时才删除
            if self.table.remove(&id).is_some() {
                list.retain(|i| i.instance_id() != id);
                count += 1;
            }
        }
        if count > 0 {
            let size = list.len();
            self.instances.store(Arc::new(list));
            debug!(strategy = NAME, removed = count, size, "instances removed");
        }
        self.metrics.removed(count);
        count
    }

    fn get(&self, id: &I::Id) -> Option<I> {
        self.table.get(id)
    }

    fn size(&self) -> usize {
        self.table.len()
    }

    fn for_each(&self, visit: &mut dyn FnMut(&I::Id, &I) -> bool) {
        self.table.for_each(|id, instance| visit(id, instance));
    }
}

impl<I> SelectorBy<I> for SourceAddressHash<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select_by(&self, key: &str) -> Option<I> {
        let list = self.instances.load();
        // 取模用列表自身长度，和映射表的计数无关
        if list.is_empty() {
            trace!(strategy = NAME, key, "select on empty set");
            return self.metrics.observe(None);
        }
        let idx = (hash_str(key) % list.len() as u64) as usize;
        self.metrics.observe(Some(list[idx].clone()))
    }
}
