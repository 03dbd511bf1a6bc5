pub mod consistent_hash;
pub mod dynamic_weighted;
pub mod random;
pub mod round_robin;
pub mod source_address_hash;
pub mod weighted_random;
pub mod weighted_round_robin;

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use crate::config::{KeyedPolicy, Policy, Settings};
use crate::rng::XorShift64;

/// 调用方持有的后端实例：唯一 id + 整数权重
///
/// 权重应 ≥ 1；0 或负数对加权策略没有定义（各策略会做保护，见各自文档）。
pub trait Instance {
    type Id: Eq + Hash + Clone;

    fn instance_id(&self) -> Self::Id;
    fn instance_weight(&self) -> i64;
}

impl<T: Instance + ?Sized> Instance for Arc<T> {
    type Id = T::Id;

    fn instance_id(&self) -> Self::Id {
        (**self).instance_id()
    }

    fn instance_weight(&self) -> i64 {
        (**self).instance_weight()
    }
}

/// 所有策略共有的成员管理接口
///
/// - `add`：id 不存在才插入，重复 id 跳过，返回实际插入数量
/// - `del`：id 存在才删除，返回实际删除数量
/// - `for_each`：回调返回 false 时停止遍历
pub trait Registry<I: Instance>: Send + Sync {
    fn add(&self, instances: &[I]) -> usize;
    fn del(&self, instances: &[I]) -> usize;
    fn get(&self, id: &I::Id) -> Option<I>;
    fn size(&self) -> usize;
    fn for_each(&self, visit: &mut dyn FnMut(&I::Id, &I) -> bool);
}

/// 按策略选择
pub trait Selector<I: Instance>: Registry<I> {
    fn select(&self) -> Option<I>;
}

/// 按 key 选择
pub trait SelectorBy<I: Instance>: Registry<I> {
    fn select_by(&self, key: &str) -> Option<I>;
}

pub use consistent_hash::ConsistentHash;
pub use dynamic_weighted::DynamicWeighted;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use source_address_hash::SourceAddressHash;
pub use weighted_random::WeightedRandom;
pub use weighted_round_robin::WeightedRoundRobin;

fn rng_from(settings: &Settings) -> XorShift64 {
    match settings.seed {
        Some(seed) => XorShift64::new(seed),
        None => XorShift64::from_entropy(),
    }
}

/// 根据配置构建按策略选择的负载均衡器
pub fn build_selector<I>(settings: &Settings) -> Box<dyn Selector<I>>
where
    I: Instance + Clone + Send + Sync + 'static,
    I::Id: Send + Sync,
{
    match settings.policy {
        Policy::Random => Box::new(Random::with_rng(rng_from(settings))),
        Policy::RoundRobin => Box::new(RoundRobin::new()),
        Policy::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
        Policy::WeightedRandom => Box::new(WeightedRandom::with_rng(rng_from(settings))),
        Policy::DynamicWeighted => Box::new(DynamicWeighted::new()),
    }
}

/// 根据配置构建按 key 选择的负载均衡器
pub fn build_selector_by<I>(settings: &Settings) -> Box<dyn SelectorBy<I>>
where
    I: Instance + Clone + Send + Sync + 'static,
    I::Id: Display + Send + Sync,
{
    match settings.keyed_policy {
        KeyedPolicy::ConsistentHash => Box::new(ConsistentHash::with_replicas(settings.replicas())),
        KeyedPolicy::SourceAddressHash => Box::new(SourceAddressHash::new()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_build_selector_from_settings() {
        for policy in [
            Policy::Random,
            Policy::RoundRobin,
            Policy::WeightedRoundRobin,
            Policy::WeightedRandom,
            Policy::DynamicWeighted,
        ] {
            let settings = Settings {
                policy,
                seed: Some(1),
                ..Default::default()
            };
            let lb = build_selector::<Arc<Service>>(&settings);
            assert!(lb.select().is_none(), "{:?} should be empty", policy);

            assert_eq!(lb.add(&five_three_two()), 3);
            assert_eq!(lb.size(), 3);
            assert!(lb.select().is_some(), "{:?}", policy);
        }
    }

    #[test]
    fn test_build_selector_by_from_settings() {
        for keyed_policy in [KeyedPolicy::ConsistentHash, KeyedPolicy::SourceAddressHash] {
            let settings = Settings {
                keyed_policy,
                replicas: Some(8),
                ..Default::default()
            };
            let lb = build_selector_by::<Arc<Service>>(&settings);
            assert!(lb.select_by("10.0.0.1").is_none());

            lb.add(&five_three_two());
            let first = lb.select_by("10.0.0.1");
            assert!(first.is_some());
            assert_eq!(first, lb.select_by("10.0.0.1"));
        }
    }

    #[test]
    fn test_every_selector_spreads_load() {
        // 10000 次选择后三个实例都应被选中过
        let settings = Settings::default();
        for policy in [
            Policy::Random,
            Policy::RoundRobin,
            Policy::WeightedRoundRobin,
            Policy::WeightedRandom,
            Policy::DynamicWeighted,
        ] {
            let lb = build_selector::<Arc<Service>>(&Settings { policy, ..settings.clone() });
            lb.add(&five_three_two());

            let mut counts: HashMap<String, usize> = HashMap::new();
            for _ in 0..10_000 {
                *counts.entry(id(&lb.select()).to_string()).or_default() += 1;
            }
            assert_eq!(counts.len(), 3, "{:?}: {:?}", policy, counts);
        }
    }

    #[test]
    fn test_arc_instance_delegates() {
        let s = service("a", 4);
        assert_eq!(s.instance_id(), "a");
        assert_eq!(s.instance_weight(), 4);
    }
}
