use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 路由核心配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub settings: RouterSettings,
    #[serde(default)]
    pub model_mapping: GlobalModelMapping,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouterSettings {
    /// 是否启用内存缓存；关闭后按 id 的查询直接回源存储
    #[serde(default = "default_true")]
    pub memory_cache_enabled: bool,
    /// 目录刷新间隔
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    /// 到期扫描间隔
    #[serde(default = "default_expiration_scan_interval")]
    pub expiration_scan_interval_seconds: u64,
    /// auto 分组按序尝试的真实分组列表
    #[serde(default)]
    pub auto_groups: Vec<String>,
    /// 上游错误触发自动禁用
    #[serde(default)]
    pub automatic_disable_enabled: bool,
    /// 调用成功后自动恢复被自动禁用的渠道
    #[serde(default)]
    pub automatic_enable_enabled: bool,
    /// 触发自动禁用的错误关键字，大小写不敏感
    #[serde(default = "default_disable_keywords")]
    pub disable_keywords: Vec<String>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            memory_cache_enabled: default_true(),
            sync_interval_seconds: default_sync_interval(),
            expiration_scan_interval_seconds: default_expiration_scan_interval(),
            auto_groups: Vec::new(),
            automatic_disable_enabled: false,
            automatic_enable_enabled: false,
            disable_keywords: default_disable_keywords(),
        }
    }
}

/// 全局模型映射
///
/// TOML/JSON 里 `equivalents` 键承载等效组，其余顶层键全部解析为
/// 单向映射：键是入口模型，值是底层模型列表。
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GlobalModelMapping {
    /// 等效组，任意元素相互等效
    #[serde(default)]
    pub equivalents: Vec<Vec<String>>,
    /// 单向映射，入口模型 -> 底层模型列表
    #[serde(flatten)]
    pub one_way: HashMap<String, Vec<String>>,
}

impl GlobalModelMapping {
    pub fn is_empty(&self) -> bool {
        self.equivalents.is_empty() && self.one_way.is_empty()
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_sync_interval() -> u64 {
    600
}

fn default_expiration_scan_interval() -> u64 {
    300
}

fn default_disable_keywords() -> Vec<String> {
    [
        "your credit balance is too low",
        "this organization has been disabled",
        "you exceeded your current quota",
        "permission denied",
        "the security token included in the request is invalid",
        "operation not allowed",
        "your account is not authorized",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl RouterConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.settings.sync_interval_seconds == 0 {
            anyhow::bail!("settings has invalid sync_interval_seconds: cannot be 0");
        }

        if self.settings.expiration_scan_interval_seconds == 0 {
            anyhow::bail!("settings has invalid expiration_scan_interval_seconds: cannot be 0");
        }

        for group in &self.settings.auto_groups {
            if group.is_empty() {
                anyhow::bail!("settings has empty group name in auto_groups");
            }
            if group == "auto" {
                anyhow::bail!("auto_groups cannot contain the 'auto' meta group itself");
            }
        }

        for keyword in &self.settings.disable_keywords {
            if keyword.is_empty() {
                anyhow::bail!("settings has empty keyword in disable_keywords");
            }
        }

        for (entry, targets) in &self.model_mapping.one_way {
            if entry.is_empty() {
                anyhow::bail!("model_mapping has one-way entry with empty model name");
            }
            for target in targets {
                if target.is_empty() {
                    anyhow::bail!(
                        "model_mapping one-way entry '{}' has empty target model name",
                        entry
                    );
                }
            }
        }

        for group in &self.model_mapping.equivalents {
            for member in group {
                if member.is_empty() {
                    anyhow::bail!("model_mapping has equivalence group with empty member name");
                }
            }
        }

        Ok(())
    }
}
