//! 进程内实例选择（负载均衡）库
//!
//! 给定一组动态变化的后端实例（可哈希的 id + 整数权重），
//! 回答"下一个请求交给谁"。所有策略都支持多线程并发增删和选择：
//!
//! | 策略 | 接口 | 说明 |
//! |---|---|---|
//! | [`RoundRobin`] | [`Selector`] | 轮询 |
//! | [`Random`] | [`Selector`] | 均匀随机 |
//! | [`WeightedRoundRobin`] | [`Selector`] | 平滑加权轮询（nginx） |
//! | [`WeightedRandom`] | [`Selector`] | 带权随机 |
//! | [`DynamicWeighted`] | [`Selector`] | 双队列平滑加权，O(1) |
//! | [`ConsistentHash`] | [`SelectorBy`] | 一致性哈希，带虚拟节点 |
//! | [`SourceAddressHash`] | [`SelectorBy`] | 源地址哈希取模 |
//!
//! ```no_run
//! use std::sync::Arc;
//! use loadbalance::{DynamicWeighted, Instance, Registry, Selector};
//!
//! struct Backend { addr: String, weight: i64 }
//!
//! impl Instance for Backend {
//!     type Id = String;
//!     fn instance_id(&self) -> String { self.addr.clone() }
//!     fn instance_weight(&self) -> i64 { self.weight }
//! }
//!
//! let lb = DynamicWeighted::new();
//! lb.add(&[
//!     Arc::new(Backend { addr: "10.0.0.1:80".into(), weight: 5 }),
//!     Arc::new(Backend { addr: "10.0.0.2:80".into(), weight: 3 }),
//! ]);
//! let picked = lb.select();
//! assert!(picked.is_some());
//! ```

pub mod config;
pub mod error;
pub mod hash;
pub mod load_balancer;
pub mod logging;
pub mod metrics;
pub mod rng;
pub mod table;

pub use config::{KeyedPolicy, Policy, Settings, load_settings};
pub use error::{Error, Result};
pub use load_balancer::{
    ConsistentHash, DynamicWeighted, Instance, Random, Registry, RoundRobin, Selector, SelectorBy,
    SourceAddressHash, WeightedRandom, WeightedRoundRobin, build_selector, build_selector_by,
};
pub use rng::XorShift64;
