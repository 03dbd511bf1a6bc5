use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_REPLICAS: usize = 3;

/// 按策略选择（不需要 key）
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Random,
    RoundRobin,
    WeightedRoundRobin,
    WeightedRandom,
    #[default]
    DynamicWeighted,
}

/// 按 key 选择
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyedPolicy {
    #[default]
    ConsistentHash,
    SourceAddressHash,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub keyed_policy: KeyedPolicy,
    pub replicas: Option<usize>,
    /// 固定随机种子，便于复现 Random / WeightedRandom 的序列
    pub seed: Option<u64>,
}

impl Settings {
    pub fn replicas(&self) -> usize {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// 解析一段 TOML 文本
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let c = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        let settings: Settings = c.try_deserialize()?;
        settings.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.replicas() == 0 {
            return Err(Error::InvalidReplicas(0));
        }
        Ok(self)
    }
}

/// 读取 loadbalance.{toml,yaml,json...}（可选），再叠加 LB_ 前缀的环境变量
pub fn load_settings() -> Result<Settings> {
    // also load .env
    dotenvy::dotenv().ok();
    let c = config::Config::builder()
        .add_source(config::File::with_name("loadbalance").required(false))
        .add_source(config::Environment::with_prefix("LB"))
        .build()?;
    let settings: Settings = c.try_deserialize()?;
    settings.validate()
}
