use anyhow::Result;
use async_trait::async_trait;

use crate::channel::{Ability, Channel, ChannelStatus};

/// 渠道持久化存储接口
///
/// 路由核心不拥有存储实现，目录刷新和状态变更都通过这个接口进行，
/// 便于依赖注入和单元测试。
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// 拉取全部渠道（包含已禁用的）
    async fn fetch_all_channels(&self) -> Result<Vec<Channel>>;

    /// 拉取全部能力记录
    async fn fetch_all_abilities(&self) -> Result<Vec<Ability>>;

    /// 按 id 直接读取渠道，内存缓存关闭时的回退路径
    async fn fetch_channel_by_id(&self, id: i32) -> Result<Channel>;

    /// 持久化状态变更，返回是否真的发生了更新
    async fn update_channel_status(
        &self,
        id: i32,
        key_hint: Option<&str>,
        status: ChannelStatus,
        reason: &str,
    ) -> bool;
}

/// 渠道状态通知接口
#[async_trait]
pub trait ChannelNotifier: Send + Sync {
    async fn notify(&self, channel_id: i32, status: ChannelStatus, subject: &str, body: &str);
}
