use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, TextEncoder, register_int_counter_vec};

use crate::error::Result;

pub static SELECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "loadbalance_selections_total",
        "Total selections performed, by strategy and outcome",
        &["strategy", "outcome"]
    )
    .unwrap()
});

pub static MEMBERSHIP_CHANGES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "loadbalance_membership_changes_total",
        "Instances actually added or removed, by strategy",
        &["strategy", "op"]
    )
    .unwrap()
});

/// 单个策略预先解析好的计数器句柄，热路径上不再做 label 查找
#[derive(Debug, Clone)]
pub struct StrategyMetrics {
    hit: IntCounter,
    empty: IntCounter,
    added: IntCounter,
    removed: IntCounter,
}

impl StrategyMetrics {
    pub fn new(strategy: &str) -> Self {
        Self {
            hit: SELECTIONS.with_label_values(&[strategy, "hit"]),
            empty: SELECTIONS.with_label_values(&[strategy, "empty"]),
            added: MEMBERSHIP_CHANGES.with_label_values(&[strategy, "add"]),
            removed: MEMBERSHIP_CHANGES.with_label_values(&[strategy, "del"]),
        }
    }

    /// 记录一次选择结果，原样返回便于链式使用
    pub fn observe<T>(&self, selected: Option<T>) -> Option<T> {
        match selected {
            Some(_) => self.hit.inc(),
            None => self.empty.inc(),
        }
        selected
    }

    pub fn added(&self, count: usize) {
        self.added.inc_by(count as u64);
    }

    pub fn removed(&self, count: usize) {
        self.removed.inc_by(count as u64);
    }
}

/// 导出默认 registry 的文本格式
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
