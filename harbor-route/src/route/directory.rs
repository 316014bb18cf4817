use harbor_core::{Ability, Channel, ChannelInfo, ChannelStatus, MultiKeyMode, RouteError};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{error, info, warn};

/// 目录快照
///
/// 一经构建不再整体修改，替换对读者是原子的。索引只收录启用的渠道，
/// id 映射收录全部渠道，禁用的渠道仍可按 id 查询。
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    /// 分组 -> 模型 -> 按优先级降序排列的渠道 id
    index: HashMap<String, HashMap<String, Vec<i32>>>,
    /// 全部渠道，按 id 寻址
    channels: HashMap<i32, Channel>,
}

impl DirectorySnapshot {
    pub fn candidates(&self, group: &str, model: &str) -> &[i32] {
        self.index
            .get(group)
            .and_then(|models| models.get(model))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn channel(&self, id: i32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// 候选列表里的 id 必须能解析出渠道
    ///
    /// 解析不到说明索引和 id 映射不一致，这属于快照构建的 bug，
    /// 需要大声报告而不是悄悄跳过。
    pub fn require_channel(&self, id: i32) -> Result<&Channel, RouteError> {
        match self.channels.get(&id) {
            Some(channel) => Ok(channel),
            None => {
                error!(
                    "channel #{} is present in a candidate list but missing from the id map",
                    id
                );
                Err(RouteError::DirectoryInconsistency { channel_id: id })
            }
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn group_count(&self) -> usize {
        self.index.len()
    }
}

/// 进程级渠道目录缓存
///
/// 读路径全部走共享锁；重建在锁外完成整个快照后，仅用一次独占临界区
/// 做 O(1) 的替换，定向编辑（状态翻转、整体替换）才会在独占锁内遍历索引。
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    current: RwLock<DirectorySnapshot>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用存储拉回的全量数据重建目录
    ///
    /// 多凭据轮询渠道的游标按 id 从旧快照带到新快照，轮询公平性
    /// 不因重建而重置。
    pub async fn rebuild(&self, channels: Vec<Channel>, abilities: Vec<Ability>) {
        let carried = self.carried_cursors().await;
        let snapshot = build_snapshot(channels, &abilities, &carried);
        let channel_count = snapshot.channel_count();
        let group_count = snapshot.group_count();

        let mut current = self.current.write().await;
        *current = snapshot;
        drop(current);

        info!(
            "channels synced into directory: {} channels across {} groups",
            channel_count, group_count
        );
    }

    /// 旧快照里多凭据轮询渠道的游标
    async fn carried_cursors(&self) -> HashMap<i32, Arc<AtomicU64>> {
        let current = self.current.read().await;
        current
            .channels
            .iter()
            .filter(|(_, channel)| {
                channel.info.is_multi_key && channel.info.multi_key_mode == MultiKeyMode::Polling
            })
            .map(|(id, channel)| (*id, channel.info.polling_index.clone()))
            .collect()
    }

    /// 共享模式的快照借用，供组合式读取序列使用
    pub async fn snapshot(&self) -> RwLockReadGuard<'_, DirectorySnapshot> {
        self.current.read().await
    }

    /// 按 id 查询渠道，禁用的渠道同样可见
    pub async fn lookup(&self, id: i32) -> Result<Channel, RouteError> {
        let current = self.current.read().await;
        current
            .channel(id)
            .cloned()
            .ok_or(RouteError::ChannelMissing { channel_id: id })
    }

    /// 按 id 查询多凭据元数据
    pub async fn channel_info(&self, id: i32) -> Result<ChannelInfo, RouteError> {
        let current = self.current.read().await;
        current
            .channel(id)
            .map(|channel| channel.info.clone())
            .ok_or(RouteError::ChannelMissing { channel_id: id })
    }

    pub async fn candidates(&self, group: &str, model: &str) -> Vec<i32> {
        let current = self.current.read().await;
        current.candidates(group, model).to_vec()
    }

    /// 就地翻转缓存渠道的状态
    ///
    /// 状态离开 `Enabled` 时同步把该 id 从所有候选列表里剔除，禁用
    /// 立即生效，不等下一次刷新。重新启用后的索引回填交给刷新完成。
    pub async fn update_status(&self, id: i32, status: ChannelStatus) {
        let mut current = self.current.write().await;
        match current.channels.get_mut(&id) {
            Some(channel) => channel.status = status,
            None => {
                warn!("update_status for unknown channel #{}", id);
            }
        }
        if !status.is_enabled() {
            remove_from_index(&mut current.index, id);
        }
    }

    /// 整体替换缓存里的渠道，管理端编辑后的定向更新
    pub async fn put(&self, channel: Channel) {
        let mut current = self.current.write().await;
        let id = channel.id;
        let enabled = channel.status.is_enabled();
        current.channels.insert(id, channel);
        if !enabled {
            remove_from_index(&mut current.index, id);
        }
    }
}

fn remove_from_index(index: &mut HashMap<String, HashMap<String, Vec<i32>>>, id: i32) {
    for models in index.values_mut() {
        for ids in models.values_mut() {
            if let Some(pos) = ids.iter().position(|&candidate| candidate == id) {
                ids.remove(pos);
            }
        }
    }
}

/// 在锁外构建完整快照
fn build_snapshot(
    channels: Vec<Channel>,
    abilities: &[Ability],
    carried: &HashMap<i32, Arc<AtomicU64>>,
) -> DirectorySnapshot {
    // 分组全集来自能力记录，没有启用渠道的分组也要占位
    let mut index: HashMap<String, HashMap<String, Vec<i32>>> = HashMap::new();
    for ability in abilities {
        index.entry(ability.group.clone()).or_default();
    }

    for channel in &channels {
        if !channel.status.is_enabled() {
            // 禁用的渠道只进 id 映射，不进路由索引
            continue;
        }
        for group in &channel.groups {
            let models = index.entry(group.clone()).or_default();
            for model in &channel.models {
                models.entry(model.clone()).or_default().push(channel.id);
            }
        }
    }

    let mut id_map: HashMap<i32, Channel> = HashMap::with_capacity(channels.len());
    for mut channel in channels {
        if channel.info.is_multi_key && channel.info.multi_key_mode == MultiKeyMode::Polling {
            if let Some(cursor) = carried.get(&channel.id) {
                channel.info.polling_index = cursor.clone();
            }
        }
        id_map.insert(channel.id, channel);
    }

    // 候选列表按优先级降序
    for models in index.values_mut() {
        for ids in models.values_mut() {
            ids.sort_by_key(|id| {
                std::cmp::Reverse(id_map.get(id).map(|c| c.priority).unwrap_or_default())
            });
        }
    }

    DirectorySnapshot {
        index,
        channels: id_map,
    }
}
