use anyhow::Result;
use harbor_core::{
    Channel, ChannelInfo, ChannelNotifier, ChannelStatus, ChannelStore, RouteError, RouterConfig,
};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::directory::ChannelDirectory;
use super::lifecycle::LifecycleManager;
use super::mapping::resolve_model_mapping;
use super::selector::select_channel;

/// 选路结果，附带实际命中的分组
#[derive(Debug, Clone)]
pub struct RoutedChannel {
    pub channel: Channel,
    /// auto 分组时为实际匹配到的真实分组
    pub group: String,
}

/// 渠道路由服务
///
/// 组合映射解析、目录缓存和选择算法，对外提供统一的选路入口，
/// 并负责目录定时刷新与到期扫描两个后台任务的启停。
pub struct ChannelRouter {
    config: Arc<RouterConfig>,
    store: Arc<dyn ChannelStore>,
    directory: Arc<ChannelDirectory>,
    lifecycle: Arc<LifecycleManager>,
    is_running: Arc<RwLock<bool>>,
}

impl ChannelRouter {
    /// 创建路由服务
    pub fn new(
        config: RouterConfig,
        store: Arc<dyn ChannelStore>,
        notifier: Arc<dyn ChannelNotifier>,
    ) -> Result<Self> {
        // 验证配置
        config.validate()?;

        let config = Arc::new(config);
        let directory = Arc::new(ChannelDirectory::new());
        let lifecycle = Arc::new(LifecycleManager::new(
            config.clone(),
            store.clone(),
            notifier,
            directory.clone(),
        )?);

        Ok(Self {
            config,
            store,
            directory,
            lifecycle,
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    pub fn directory(&self) -> Arc<ChannelDirectory> {
        self.directory.clone()
    }

    pub fn lifecycle(&self) -> Arc<LifecycleManager> {
        self.lifecycle.clone()
    }

    /// 从存储全量重建目录
    ///
    /// 拉取失败时整轮刷新作废，现有快照继续服务。
    pub async fn refresh(&self) -> Result<()> {
        let channels = self.store.fetch_all_channels().await?;
        let abilities = self.store.fetch_all_abilities().await?;
        self.directory.rebuild(channels, abilities).await;
        Ok(())
    }

    /// 启动路由服务
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Ok(());
            }
            *running = true;
        }

        info!("Starting channel router");

        // 首次刷新失败直接报给调用方
        self.refresh().await?;

        // 目录定时刷新
        let store = self.store.clone();
        let directory = self.directory.clone();
        let is_running = self.is_running.clone();
        let sync_interval = self.config.settings.sync_interval_seconds;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(sync_interval)).await;
                if !*is_running.read().await {
                    break;
                }
                debug!("syncing channels from store");
                let fetched = match (store.fetch_all_channels().await, store.fetch_all_abilities().await)
                {
                    (Ok(channels), Ok(abilities)) => Some((channels, abilities)),
                    (Err(e), _) | (_, Err(e)) => {
                        // 本轮作废，上一份快照继续服务
                        error!("Channel sync failed, keeping previous snapshot: {}", e);
                        None
                    }
                };
                if let Some((channels, abilities)) = fetched {
                    directory.rebuild(channels, abilities).await;
                }
            }
        });

        // 到期扫描
        let lifecycle = self.lifecycle.clone();
        let is_running_scan = self.is_running.clone();
        let scan_interval = self.config.settings.expiration_scan_interval_seconds;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(scan_interval)).await;
                if !*is_running_scan.read().await {
                    break;
                }
                if let Err(e) = lifecycle.scan_expired_channels().await {
                    error!("Expired channel scan failed: {}", e);
                }
            }
        });

        info!("Channel router started successfully");
        Ok(())
    }

    /// 停止路由服务
    pub async fn stop(&self) {
        let mut running = self.is_running.write().await;
        *running = false;
        info!("Channel router stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 为 (分组, 模型) 选出一个可用渠道
    ///
    /// `retry` 是本次请求的第几次尝试，驱动优先级降档。`auto` 分组
    /// 按配置顺序逐个尝试真实分组，返回值带上实际命中的分组。
    pub async fn get_channel(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<RoutedChannel, RouteError> {
        if group == "auto" {
            if self.config.settings.auto_groups.is_empty() {
                return Err(RouteError::AutoGroupUnavailable);
            }
            for auto_group in &self.config.settings.auto_groups {
                debug!("trying auto group '{}' for model '{}'", auto_group, model);
                match self.get_group_channel(auto_group, model, retry).await {
                    Ok(Some(channel)) => {
                        debug!("auto group '{}' matched", auto_group);
                        return Ok(RoutedChannel {
                            channel,
                            group: auto_group.clone(),
                        });
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        // auto 分组逐个试错，单组失败不终止整体
                        debug!("auto group '{}' failed: {}", auto_group, e);
                        continue;
                    }
                }
            }
            return Err(RouteError::ChannelNotFound {
                group: group.to_string(),
                model: model.to_string(),
            });
        }

        match self.get_group_channel(group, model, retry).await? {
            Some(channel) => Ok(RoutedChannel {
                channel,
                group: group.to_string(),
            }),
            None => Err(RouteError::ChannelNotFound {
                group: group.to_string(),
                model: model.to_string(),
            }),
        }
    }

    /// 单个真实分组内的选路
    async fn get_group_channel(
        &self,
        group: &str,
        model: &str,
        retry: usize,
    ) -> Result<Option<Channel>, RouteError> {
        let (target_models, used_mapping) =
            resolve_model_mapping(model, &self.config.model_mapping);

        let snapshot = self.directory.snapshot().await;

        let mut candidates: Vec<i32> = if used_mapping {
            // 聚合所有目标模型的候选并按 id 去重
            let mut seen: HashSet<i32> = HashSet::new();
            let mut ids = Vec::new();
            for target in &target_models {
                for &id in snapshot.candidates(group, target) {
                    if seen.insert(id) {
                        ids.push(id);
                    }
                }
            }
            ids
        } else {
            snapshot.candidates(group, model).to_vec()
        };

        if candidates.is_empty() {
            // 归一化模型名后再试一次
            let normalized = normalize_model_name(model);
            candidates = snapshot.candidates(group, &normalized).to_vec();
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let mut rng = rand::rng();
        let selected = select_channel(&snapshot, &candidates, retry, &mut rng)?;

        if !used_mapping
            || (selected.supports_model(model) && target_models.iter().any(|m| m == model))
        {
            return Ok(Some(selected));
        }

        // 渠道支持的模型与映射目标取交集
        let acceptable: Vec<&String> = selected
            .models
            .iter()
            .filter(|m| target_models.contains(m))
            .collect();
        if acceptable.is_empty() {
            return Err(RouteError::NoAcceptableModel {
                model: model.to_string(),
            });
        }

        // 不动缓存里的渠道，拷贝一份再合并改写表
        let picked = acceptable[rng.random_range(0..acceptable.len())].clone();
        let mut specialized = selected;
        specialized.model_mapping.insert(model.to_string(), picked);
        Ok(Some(specialized))
    }

    /// 按 id 查询渠道，内存缓存关闭时直接回源存储
    pub async fn lookup_channel_by_id(&self, id: i32) -> Result<Channel, RouteError> {
        if !self.config.settings.memory_cache_enabled {
            return self
                .store
                .fetch_channel_by_id(id)
                .await
                .map_err(RouteError::Store);
        }
        self.directory.lookup(id).await
    }

    /// 按 id 查询多凭据元数据
    pub async fn get_channel_info(&self, id: i32) -> Result<ChannelInfo, RouteError> {
        if !self.config.settings.memory_cache_enabled {
            return self
                .store
                .fetch_channel_by_id(id)
                .await
                .map(|channel| channel.info)
                .map_err(RouteError::Store);
        }
        self.directory.channel_info(id).await
    }

    /// 定向更新缓存渠道状态，不等下一次刷新
    pub async fn update_channel_status(&self, id: i32, status: ChannelStatus) {
        self.directory.update_status(id, status).await;
    }

    /// 管理端编辑后的整体替换
    pub async fn put_channel(&self, channel: Channel) {
        self.directory.put(channel).await;
    }
}

/// 模型名归一化：去首尾空白并统一小写
fn normalize_model_name(model: &str) -> String {
    model.trim().to_ascii_lowercase()
}
