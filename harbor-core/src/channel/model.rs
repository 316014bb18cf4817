use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// 渠道状态
///
/// `Enabled` 之外的任何状态都会把渠道从路由索引中剔除，
/// 但渠道仍然保留在 id 映射里，供管理端按 id 查询。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// 正常参与路由
    Enabled,
    /// 管理员手动禁用
    ManuallyDisabled,
    /// 上游错误触发的自动禁用，可被自动启用恢复
    AutoDisabled,
    /// 到期禁用，需要管理员手动恢复
    ExpiredDisabled,
}

impl ChannelStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ChannelStatus::Enabled)
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelStatus::Enabled => "enabled",
            ChannelStatus::ManuallyDisabled => "manually_disabled",
            ChannelStatus::AutoDisabled => "auto_disabled",
            ChannelStatus::ExpiredDisabled => "expired_disabled",
        };
        write!(f, "{}", s)
    }
}

/// 渠道的上游协议族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// OpenAI兼容格式（默认）
    #[default]
    OpenAI,
    /// Anthropic Claude格式
    Claude,
    /// Google Gemini格式
    Gemini,
}

/// 多凭据轮换模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiKeyMode {
    /// 每次请求随机挑选凭据
    #[default]
    Random,
    /// 按游标轮询凭据
    Polling,
}

/// 多凭据元数据
///
/// `polling_index` 用 `Arc<AtomicU64>` 保存：渠道的所有克隆共享同一个
/// 游标，请求路径上的递增不需要拿目录锁，缓存重建时只要把旧渠道的
/// Arc 带到新快照就不会丢失计数。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub is_multi_key: bool,
    #[serde(default)]
    pub multi_key_mode: MultiKeyMode,
    #[serde(skip, default)]
    pub polling_index: Arc<AtomicU64>,
}

impl ChannelInfo {
    /// 推进轮询游标，返回推进前的值
    pub fn advance_polling_index(&self) -> u64 {
        self.polling_index.fetch_add(1, Ordering::Relaxed)
    }

    pub fn polling_index(&self) -> u64 {
        self.polling_index.load(Ordering::Relaxed)
    }
}

/// 渠道的自由格式设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// RFC3339 格式的到期时间，带时区，例如 "2026-01-02T15:04:05+08:00"
    #[serde(default)]
    pub expiration_time: Option<String>,
    /// 是否允许自动禁用该渠道
    #[serde(default = "default_true")]
    pub auto_ban: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            expiration_time: None,
            auto_ban: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 可路由的上游渠道
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    pub status: ChannelStatus,
    /// 渠道服务的分组列表
    #[serde(default)]
    pub groups: Vec<String>,
    /// 渠道支持的模型列表
    #[serde(default)]
    pub models: Vec<String>,
    /// 优先级，数值越大越优先
    #[serde(default)]
    pub priority: i64,
    /// 同一优先级内的相对权重
    #[serde(default)]
    pub weight: u32,
    /// 模型名改写表：请求名 -> 底层名
    #[serde(default)]
    pub model_mapping: HashMap<String, String>,
    #[serde(default)]
    pub info: ChannelInfo,
    /// 多凭据列表
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub settings: ChannelSettings,
}

impl Channel {
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn serves_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    /// 游标当前指向的凭据，不推进游标
    pub fn current_key(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        if self.info.is_multi_key && self.info.multi_key_mode == MultiKeyMode::Polling {
            let idx = self.info.polling_index() as usize % self.keys.len();
            return self.keys.get(idx).map(String::as_str);
        }
        self.keys.first().map(String::as_str)
    }

    /// 取本次请求应使用的凭据
    ///
    /// 轮询模式推进共享游标，随机模式用注入的随机源挑选，
    /// 其余情况返回首个凭据。
    pub fn next_key<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        if self.info.is_multi_key {
            match self.info.multi_key_mode {
                MultiKeyMode::Polling => {
                    let idx = self.info.advance_polling_index() as usize;
                    return self.keys.get(idx % self.keys.len()).map(String::as_str);
                }
                MultiKeyMode::Random => {
                    let idx = rng.random_range(0..self.keys.len());
                    return self.keys.get(idx).map(String::as_str);
                }
            }
        }
        self.keys.first().map(String::as_str)
    }

    /// 解析到期时间
    ///
    /// 未设置或无法解析时返回 `None`，即到期判定失败时保持渠道可用。
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.settings.expiration_time.as_deref()?;
        if raw.is_empty() {
            return None;
        }
        match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                warn!(
                    "Failed to parse expiration time '{}' for channel #{}: {}",
                    raw, self.id, e
                );
                None
            }
        }
    }
}

/// (分组, 模型, 渠道) 能力记录，刷新时用来枚举分组全集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ability {
    pub group: String,
    pub model: String,
    pub channel_id: i32,
}
