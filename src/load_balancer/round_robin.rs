use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::load_balancer::{Instance, Registry, Selector};
use crate::metrics::StrategyMetrics;
use crate::table::InstanceTable;

const NAME: &str = "round_robin";

#[derive(Debug)]
struct RoundRobinState<I> {
    instances: Vec<I>,
    /// 下一次要返回的位置
    cursor: usize,
}

/// 轮询负载均衡
///
/// 列表按插入顺序排列；删除是原地拼接，和游标推进共用一把互斥锁。
pub struct RoundRobin<I: Instance> {
    table: InstanceTable<I::Id, I>,
    state: Mutex<RoundRobinState<I>>,
    metrics: StrategyMetrics,
}

impl<I> RoundRobin<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self {
            table: InstanceTable::new(),
            state: Mutex::new(RoundRobinState {
                instances: Vec::with_capacity(8),
                cursor: 0,
            }),
            metrics: StrategyMetrics::new(NAME),
        }
    }
}

impl<I> Default for RoundRobin<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for RoundRobin<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for instance in instances {
            if self.table.insert_if_absent(instance.instance_id(), instance.clone()) {
                state.instances.push(instance.clone());
                count += 1;
            }
        }
        let size = state.instances.len();
        drop(state);

        self.metrics.added(count);
        debug!(strategy = NAME, added = count, size, "instances added");
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let mut state = self.state.lock();
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            if self.table.remove(&id).is_none() {
                continue;
            }
            if let Some(pos) = state.instances.iter().position(|i| i.instance_id() == id) {
                state.instances.remove(pos);
                // 被删位置在游标之前时左移游标，保持剩余实例的轮转顺序
                if pos < state.cursor {
                    state.cursor -= 1;
                }
            }
            count += 1;
        }
        if state.cursor >= state.instances.len() {
            state.cursor = 0;
        }
        let size = state.instances.len();
        drop(state);

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

impl<I> Selector<I> for RoundRobin<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select(&self) -> Option<I> {
        let mut state = self.state.lock();
        let len = state.instances.len();
        if len == 0 {
            drop(state);
            trace!(strategy = NAME, "select on empty set");
            return self.metrics.observe(None);
        }

        let index = state.cursor % len;
        state.cursor = (index + 1) % len;
        let selected = state.instances[index].clone();
        drop(state);

        self.metrics.observe(Some(selected))
    }
}
