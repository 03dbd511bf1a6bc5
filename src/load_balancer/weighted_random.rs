use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::load_balancer::{Instance, Registry, Selector};
use crate::metrics::StrategyMetrics;
use crate::rng::XorShift64;
use crate::table::InstanceTable;

const NAME: &str = "weighted_random";

/// 单个实例及加入时记录的权重
#[derive(Debug, Clone)]
struct WeightedEntry<I> {
    instance: I,
    weight: i64,
}

#[derive(Debug)]
struct WeightedRandomInner<I> {
    /// 按权重降序，重的实例在扫描时更早命中
    entries: Vec<WeightedEntry<I>>,
    weight_sum: i64,
}

impl<I> WeightedRandomInner<I> {
    fn resort(&mut self) {
        // 稳定排序，同权重保持插入顺序
        self.entries.sort_by(|a, b| b.weight.cmp(&a.weight));
    }

    /// `draw` ∈ [1, weight_sum]，线性扫描到累计权重覆盖它为止
    fn pick(&self, mut draw: i64) -> Option<&I> {
        for entry in &self.entries {
            draw -= entry.weight;
            if draw <= 0 {
                return Some(&entry.instance);
            }
        }
        None
    }
}

/// 带权随机负载均衡
///
/// 权重在 add 时记录下来，weight_sum 和 del 都用这份记录，
/// 实例自身权重之后变化不会让总和失配。负权重按 0 处理。
pub struct WeightedRandom<I: Instance> {
    table: InstanceTable<I::Id, I>,
    inner: Mutex<WeightedRandomInner<I>>,
    rng: XorShift64,
    metrics: StrategyMetrics,
}

impl<I> WeightedRandom<I>
where
    I: Instance + Clone,
{
    pub fn new() -> Self {
        Self::with_rng(XorShift64::from_entropy())
    }

    pub fn with_rng(rng: XorShift64) -> Self {
        Self {
            table: InstanceTable::new(),
            inner: Mutex::new(WeightedRandomInner {
                entries: Vec::with_capacity(8),
                weight_sum: 0,
            }),
            rng,
            metrics: StrategyMetrics::new(NAME),
        }
    }

    /// 当前权重总和
    pub fn weight_sum(&self) -> i64 {
        self.inner.lock().weight_sum
    }
}

impl<I> Default for WeightedRandom<I>
where
    I: Instance + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Registry<I> for WeightedRandom<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn add(&self, instances: &[I]) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for instance in instances {
            if !self.table.insert_if_absent(instance.instance_id(), instance.clone()) {
                continue;
            }
            let mut weight = instance.instance_weight();
            if weight < 0 {
                warn!(strategy = NAME, weight, "negative weight treated as 0");
                weight = 0;
            }
            inner.weight_sum += weight;
            inner.entries.push(WeightedEntry {
                instance: instance.clone(),
                weight,
            });
            count += 1;
        }
        if count > 0 {
            inner.resort();
        }
        let weight_sum = inner.weight_sum;
        drop(inner);

        self.metrics.added(count);
        debug!(strategy = NAME, added = count, weight_sum, "instances added");
        count
    }

    fn del(&self, instances: &[I]) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for instance in instances {
            let id = instance.instance_id();
            if self.table.remove(&id).is_none() {
                continue;
            }
            if let Some(pos) = inner.entries.iter().position(|e| e.instance.instance_id() == id) {
                let removed = inner.entries.remove(pos);
                inner.weight_sum -= removed.weight;
            }
            count += 1;
        }
        // 删除保持相对顺序，无需重新排序
        let weight_sum = inner.weight_sum;
        drop(inner);

        self.metrics.removed(count);
        debug!(strategy = NAME, removed = count, weight_sum, "instances removed");
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

impl<I> Selector<I> for WeightedRandom<I>
where
    I: Instance + Clone + Send + Sync,
    I::Id: Send + Sync,
{
    fn select(&self) -> Option<I> {
        let inner = self.inner.lock();
        // 空集或全部权重为 0 时没有可取模的区间
        if inner.weight_sum <= 0 {
            drop(inner);
            trace!(strategy = NAME, "select with zero weight sum");
            return self.metrics.observe(None);
        }

        let draw = (self.rng.int63() % inner.weight_sum).abs() + 1;
        let selected = inner.pick(draw).cloned();
        drop(inner);

        self.metrics.observe(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_selection() {
        let lb = WeightedRandom::with_rng(XorShift64::new(17));
        lb.add(&five_three_two());
        assert_eq!(lb.weight_sum(), 10);

        let mut counts: HashMap<String, f64> = HashMap::new();
        let total = 10_000;
        for _ in 0..total {
            *counts.entry(id(&lb.select()).to_string()).or_default() += 1.0;
        }

        // 比例应接近 5:3:2
        for (addr, expected) in [
            ("192.168.0.90:9000", 0.5),
            ("192.168.0.90:9001", 0.3),
            ("192.168.0.90:9002", 0.2),
        ] {
            let ratio = counts[addr] / total as f64;
            assert!((ratio - expected).abs() < 0.03, "{} ratio {}", addr, ratio);
        }
    }

    #[test]
    fn test_sorted_by_descending_weight() {
        let lb = WeightedRandom::new();
        lb.add(&[service("light", 1), service("heavy", 9), service("mid", 4)]);

        let inner = lb.inner.lock();
        let order: Vec<_> = inner.entries.iter().map(|e| e.instance.address.as_str()).collect();
        assert_eq!(order, ["heavy", "mid", "light"]);
        // draw=1 总是落在最重的实例上
        assert_eq!(inner.pick(1).unwrap().address, "heavy");
        assert_eq!(inner.pick(10).unwrap().address, "mid");
        assert_eq!(inner.pick(14).unwrap().address, "light");
        assert!(inner.pick(15).is_none());
    }

    #[test]
    fn test_dynamic_update() {
        let lb = WeightedRandom::new();
        let first = service("http://localhost:30000", 1);
        lb.add(&[first.clone()]);
        assert_eq!(id(&lb.select()), "http://localhost:30000");

        lb.add(&[service("http://localhost:30001", 1), service("http://localhost:30002", 2)]);
        assert_eq!(lb.del(&[first]), 1);
        assert_eq!(lb.weight_sum(), 3);

        let mut urls = vec![];
        for _ in 0..50 {
            urls.push(id(&lb.select()).to_string());
        }
        assert!(urls.iter().all(|u| u != "http://localhost:30000"));
        assert!(urls.iter().any(|u| u == "http://localhost:30002"));
    }

    #[test]
    fn test_zero_weight_sum_returns_none() {
        let lb: WeightedRandom<Arc<Service>> = WeightedRandom::new();
        assert!(lb.select().is_none());

        lb.add(&[service("zero", 0), service("negative", -5)]);
        assert_eq!(lb.size(), 2);
        assert_eq!(lb.weight_sum(), 0);
        assert!(lb.select().is_none());
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let lb = WeightedRandom::with_rng(XorShift64::new(5));
        lb.add(&[service("zero", 0), service("one", 1)]);
        for _ in 0..500 {
            assert_eq!(id(&lb.select()), "one");
        }
    }

    #[test]
    fn test_duplicate_add_not_counted_twice() {
        let lb = WeightedRandom::new();
        let a = service("a", 4);
        assert_eq!(lb.add(&[a.clone(), a.clone()]), 1);
        assert_eq!(lb.add(&[a.clone(), service("b", 2)]), 1);
        assert_eq!(lb.weight_sum(), 6);
        assert_eq!(lb.inner.lock().entries.len(), 2);

        assert_eq!(lb.del(&[a.clone(), a]), 1);
        assert_eq!(lb.weight_sum(), 2);
    }

    #[test]
    fn test_concurrent_add_del_select() {
        crate::logging::init_tracing();
        let lb: Arc<WeightedRandom<Arc<Service>>> = Arc::new(WeightedRandom::new());
        lb.add(&[service("anchor", 1)]);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let lb = Arc::clone(&lb);
                thread::spawn(move || {
                    for i in 0..300 {
                        let s = service(&format!("{}-{}", t, i), (i % 7 + 1) as i64);
                        assert_eq!(lb.add(&[s.clone(), s.clone()]), 1);
                        assert_eq!(lb.add(&[s.clone()]), 0);
                        assert!(lb.select().is_some());
                        if i % 3 != 0 {
                            assert_eq!(lb.del(&[s]), 1);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // 每个线程保留 i % 3 == 0 的 100 个
        assert_eq!(lb.size(), 1 + 4 * 100);
        let mut live_sum = 0;
        lb.for_each(&mut |_, s| {
            live_sum += s.instance_weight();
            true
        });
        assert_eq!(lb.weight_sum(), live_sum);
        assert_eq!(lb.inner.lock().entries.len(), lb.size());
    }
}
