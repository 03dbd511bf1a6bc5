use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::DEFAULT_REPLICAS;
use crate::hash::hash_str;
use crate::load_balancer::{Instance, Registry, SelectorBy};
use crate::metrics::StrategyMetrics;
use crate::table::InstanceTable;

const NAME: &str = "consistent_hash";

/// 环上的一个虚拟节点，带上所属实例的 id，删除时按 id 过滤
#[derive(Debug, Clone)]
struct RingEntry<K, I> {
    hash: u64,
    id: K,
    instance: I,
}

/// 哈希环（不可变对象），按 hash 升序排列
#[derive(Debug)]
struct HashRing<K, I> {
    entries: Vec<RingEntry<K, I>>,
}

impl<K, I> HashRing<K, I> {
    fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// 第一个 hash ≥ 给定值的位置；超过最大位置时回到环首
    fn find(&self, hash: u64) -> Option<&I> {
        if self.entries.is_empty() {
            return None;
        }
        let mut idx = self.entries.partition_point(|e| e.hash < hash);
        // 先判断越界再读取
        if idx == self.entries.len() {
            idx = 0;
        }
        Some(&self.entries[idx].instance)
    }
}

fn replica_key(id: &impl Display, replica: usize) -> String {
    format!("{}-{}", id, replica)
}

/// 一致性哈希负载均衡
///
/// 每个实例在环上占 `replicas` 个虚拟节点，位置为 `hash("{id}-{i}")`。
/// 增删实例只影响相邻区间内的 key。
///
/// 环以写时复制方式发布：`select_by` 只做一次无锁加载，
/// 增删在写锁内基于当前环构造新环后整体替换。
pub struct ConsistentHash<I: Instance> {
    table: InstanceTable<I::Id, I>,
    ring: ArcSwap<HashRing<I::Id, I>>,
    writer: Mutex<()>,
    replicas: usize,
    metrics: StrategyMetrics,
}

impl<I> ConsistentHash<I>
where
    I: Instance + Clone,
    I::Id: Display,
{
    pub fn new() -> Self {
        Self::with_replicas(DEFAULT_REPLICAS)
    }

    /// `replicas` 为 0 时按 1 处理
    pub fn with_replicas(replicas: usize) -> Self {
        let replicas = replicas.max(1);
        debug!(strategy = NAME, replicas, "creating consistent hash ring");
        Self {
            table: InstanceTable::new(),
            ring: ArcSwap::from_pointee(HashRing::empty()),
            writer: Mutex::new(()),
            replicas,
            metrics: StrategyMetrics::new(NAME),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// 环上的虚拟节点总数
    pub fn positions(&self) -> usize {
        self.ring.load().entries.len()
    }
}

impl<I> Default for ConsistentHash<I>
where
    I: Instance + Clone,
    I::Id: Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for ConsistentHash<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Display + Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let _guard = self.writer.lock();
        let mut entries = self.ring.load().entries.clone();
        let mut count = 0;

        for instance in instances {
            let id = instance.instance_id();
            if !self.table.insert_if_absent(id.clone(), instance.clone()) {
                continue;
            }
            // 实例去重只看 id；每个副本各占一个位置
            for i in 0..self.replicas {
                entries.push(RingEntry {
                    hash: hash_str(&replica_key(&id, i)),
                    id: id.clone(),
                    instance: instance.clone(),
                });
            }
            count += 1;
        }

        if count > 0 {
            entries.sort_by_key(|e| e.hash);
            let positions = entries.len();
            self.ring.store(Arc::new(HashRing { entries }));
            debug!(strategy = NAME, added = count, positions, "ring rebuilt");
        }
        self.metrics.added(count);
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let _guard = self.writer.lock();
        let mut removed = HashSet::new();
        for instance in instances {
            let id = instance.instance_id();
            if self.table.remove(&id).is_some() {
                removed.insert(id);
            }
        }

        let count = removed.len();
        if count > 0 {
            let entries: Vec<_> = self
                .ring
                .load()
                .entries
                .iter()
                .filter(|e| !removed.contains(&e.id))
                .cloned()
                .collect();
            let positions = entries.len();
            self.ring.store(Arc::new(HashRing { entries }));
            debug!(strategy = NAME, removed = count, positions, "ring rebuilt");
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

impl<I> SelectorBy<I> for ConsistentHash<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Display + Send + Sync,
{
    fn select_by(&self, key: &str) -> Option<I> {
        let ring = self.ring.load();
        let selected = ring.find(hash_str(key)).cloned();
        if selected.is_none() {
            trace!(strategy = NAME, key, "select on empty ring");
        }
        self.metrics.observe(selected)
    }
}
