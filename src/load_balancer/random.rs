use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::load_balancer::{Instance, Registry, Selector};
use crate::metrics::StrategyMetrics;
use crate::rng::XorShift64;
use crate::table::InstanceTable;

const NAME: &str = "random";

/// 随机负载均衡：在当前实例中均匀抽取
pub struct Random<I: Instance> {
    table: InstanceTable<I::Id, I>,
    instances: Mutex<Vec<I>>,
    rng: XorShift64,
    metrics: StrategyMetrics,
}

impl<I> Random<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self::with_rng(XorShift64::from_entropy())
    }

    pub fn with_rng(rng: XorShift64) -> Self {
        Self {
            table: InstanceTable::new(),
            instances: Mutex::new(Vec::with_capacity(8)),
            rng,
            metrics: StrategyMetrics::new(NAME),
        }
    }
}

impl<I> Default for Random<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for Random<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let mut list = self.instances.lock();
        let mut count = 0;
        for instance in instances {
            if self.table.insert_if_absent(instance.instance_id(), instance.clone()) {
                list.push(instance.clone());
                count += 1;
            }
        }
        let size = list.len();
        drop(list);

        self.metrics.added(count);
        debug!(strategy = NAME, added = count, size, "instances added");
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let mut list = self.instances.lock();
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            if self.table.remove(&id).is_some() {
                list.retain(|i| i.instance_id() != id);
                count += 1;
            }
        }
        let size = list.len();
        drop(list);

        self.metrics.removed(count);
        debug!(strategy = NAME, removed = count, size, "instances removed");
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

impl<I> Selector<I> for Random<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select(&self) -> Option<I> {
        let list = self.instances.lock();
        if list.is_empty() {
            drop(list);
            trace!(strategy = NAME, "select on empty set");
            return self.metrics.observe(None);
        }

        let index = (self.rng.next_u64() % list.len() as u64) as usize;
        let selected = list[index].clone();
        drop(list);

        self.metrics.observe(Some(selected))
    }
}
