use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::load_balancer::{Instance, Registry, Selector};
use crate::metrics::StrategyMetrics;
use crate::table::InstanceTable;

const NAME: &str = "weighted_round_robin";

#[derive(Debug)]
struct WeightNode<I> {
    instance: I,
    /// 加入时约定的权重
    weight: i64,
    /// 临时权重，每轮选择都会变化
    current_weight: i64,
    /// 有效权重，默认等于 weight；低于 weight 时每轮 +1 直到恢复
    effective_weight: i64,
}

/// 平滑加权轮询（nginx 算法）
///
/// 每次选择：所有节点 current_weight += effective_weight，
/// 取 current_weight 最大者（并列时取先遍历到的），
/// 再把它的 current_weight 减去 effective_weight 总和。
pub struct WeightedRoundRobin<I: Instance> {
    table: InstanceTable<I::Id, I>,
    nodes: Mutex<Vec<WeightNode<I>>>,
    metrics: StrategyMetrics,
}

impl<I> WeightedRoundRobin<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self {
            table: InstanceTable::new(),
            nodes: Mutex::new(Vec::with_capacity(8)),
            metrics: StrategyMetrics::new(NAME),
        }
    }
}

impl<I> Default for WeightedRoundRobin<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for WeightedRoundRobin<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let mut nodes = self.nodes.lock();
        let mut count = 0;
        for instance in instances {
            if !self.table.insert_if_absent(instance.instance_id(), instance.clone()) {
                continue;
            }
            let weight = instance.instance_weight();
            nodes.push(WeightNode {
                instance: instance.clone(),
                weight,
                current_weight: 0,
                effective_weight: weight,
            });
            count += 1;
        }
        let size = nodes.len();
        drop(nodes);

        self.metrics.added(count);
        debug!(strategy = NAME, added = count, size, "instances added");
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let mut nodes = self.nodes.lock();
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            if self.table.remove(&id).is_none() {
                continue;
            }
            if let Some(pos) = nodes.iter().position(|n| n.instance.instance_id() == id) {
                nodes.remove(pos);
            }
            count += 1;
        }
        let size = nodes.len();
        drop(nodes);

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

impl<I> Selector<I> for WeightedRoundRobin<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select(&self) -> Option<I> {
        let mut nodes = self.nodes.lock();
        let mut best: Option<(usize, i64)> = None;
        let mut total = 0;

        for (i, node) in nodes.iter_mut().enumerate() {
            total += node.effective_weight;
            node.current_weight += node.effective_weight;
            if node.effective_weight < node.weight {
                node.effective_weight += 1;
            }
            // 严格大于才替换，并列时保留先遇到的
            if best.is_none_or(|(_, w)| node.current_weight > w) {
                best = Some((i, node.current_weight));
            }
        }

        let selected = best.map(|(b, _)| {
            let node = &mut nodes[b];
            node.current_weight -= total;
            node.instance.clone()
        });
        drop(nodes);

        if selected.is_none() {
            trace!(strategy = NAME, "select on empty set");
        }
        self.metrics.observe(selected)
    }
}
