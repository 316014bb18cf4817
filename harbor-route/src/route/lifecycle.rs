use aho_corasick::AhoCorasick;
use anyhow::Result;
use chrono::Utc;
use harbor_core::{
    Channel, ChannelKind, ChannelNotifier, ChannelStatus, ChannelStore, RouterConfig,
    UpstreamError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::directory::ChannelDirectory;

/// 上游调用失败时随错误一起传入的渠道上下文
#[derive(Debug, Clone)]
pub struct ChannelErrorContext {
    pub channel_id: i32,
    pub channel_name: String,
    pub kind: ChannelKind,
    /// 多凭据渠道本次使用的凭据
    pub using_key: Option<String>,
    /// 渠道级的自动禁用开关
    pub auto_ban: bool,
}

/// 渠道生命周期管理
///
/// 负责错误分类、状态机流转（启用 ⇄ 自动禁用、启用 → 到期禁用）、
/// 状态持久化以及通知去重。状态翻转会同步写进目录，禁用即时生效。
pub struct LifecycleManager {
    config: Arc<RouterConfig>,
    store: Arc<dyn ChannelStore>,
    notifier: Arc<dyn ChannelNotifier>,
    directory: Arc<ChannelDirectory>,
    keyword_matcher: Option<AhoCorasick>,
    /// 每个渠道最近一次通知过的状态，同一状态只通知一次
    last_notified: Mutex<HashMap<i32, ChannelStatus>>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<RouterConfig>,
        store: Arc<dyn ChannelStore>,
        notifier: Arc<dyn ChannelNotifier>,
        directory: Arc<ChannelDirectory>,
    ) -> Result<Self> {
        let keyword_matcher = if config.settings.disable_keywords.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&config.settings.disable_keywords)?,
            )
        };
        Ok(Self {
            config,
            store,
            notifier,
            directory,
            keyword_matcher,
            last_notified: Mutex::new(HashMap::new()),
        })
    }

    /// 判断上游错误是否该触发自动禁用
    pub fn should_disable_channel(&self, kind: ChannelKind, err: &UpstreamError) -> bool {
        if !self.config.settings.automatic_disable_enabled {
            return false;
        }
        if err.channel_error {
            return true;
        }
        if err.skip_retry {
            return false;
        }
        if err.status_code == 401 {
            return true;
        }
        if err.status_code == 403 && kind == ChannelKind::Gemini {
            return true;
        }
        if let Some(code) = err.code.as_deref() {
            match code {
                "invalid_api_key"
                | "account_deactivated"
                | "billing_not_active"
                | "pre_consume_token_quota_failed"
                | "Arrearage" => return true,
                _ => {}
            }
        }
        if let Some(error_type) = err.kind.as_deref() {
            match error_type {
                // https://docs.anthropic.com/claude/reference/errors
                "insufficient_quota"
                | "insufficient_user_quota"
                | "authentication_error"
                | "permission_error"
                | "forbidden" => return true,
                _ => {}
            }
        }
        match &self.keyword_matcher {
            Some(matcher) => matcher.is_match(&err.message),
            None => false,
        }
    }

    /// 判断调用成功后是否该自动恢复渠道
    pub fn should_enable_channel(
        &self,
        error: Option<&UpstreamError>,
        status: ChannelStatus,
    ) -> bool {
        if !self.config.settings.automatic_enable_enabled {
            return false;
        }
        if error.is_some() {
            return false;
        }
        status == ChannelStatus::AutoDisabled
    }

    /// 依据一次上游调用的结果驱动状态机
    pub async fn handle_upstream_result(
        &self,
        ctx: &ChannelErrorContext,
        status: ChannelStatus,
        error: Option<&UpstreamError>,
    ) {
        match error {
            Some(err) => {
                if self.should_disable_channel(ctx.kind, err) {
                    self.disable_channel(ctx, &err.to_string()).await;
                }
            }
            None => {
                if self.should_enable_channel(None, status) {
                    self.enable_channel(ctx.channel_id, ctx.using_key.as_deref(), &ctx.channel_name)
                        .await;
                }
            }
        }
    }

    /// 自动禁用渠道并通知
    pub async fn disable_channel(&self, ctx: &ChannelErrorContext, reason: &str) {
        info!(
            "Channel '{}' (#{}) failed, about to disable: {}",
            ctx.channel_name, ctx.channel_id, reason
        );

        if !ctx.auto_ban {
            info!(
                "Channel '{}' (#{}) has auto ban turned off, skipping disable",
                ctx.channel_name, ctx.channel_id
            );
            return;
        }

        let success = self
            .store
            .update_channel_status(
                ctx.channel_id,
                ctx.using_key.as_deref(),
                ChannelStatus::AutoDisabled,
                reason,
            )
            .await;
        if success {
            self.directory
                .update_status(ctx.channel_id, ChannelStatus::AutoDisabled)
                .await;
            let subject = format!(
                "Channel '{}' (#{}) has been disabled",
                ctx.channel_name, ctx.channel_id
            );
            let body = format!(
                "Channel '{}' (#{}) has been disabled, reason: {}",
                ctx.channel_name, ctx.channel_id, reason
            );
            self.notify_once(ctx.channel_id, ChannelStatus::AutoDisabled, &subject, &body)
                .await;
        }
    }

    /// 自动恢复被自动禁用的渠道并通知
    pub async fn enable_channel(&self, channel_id: i32, using_key: Option<&str>, channel_name: &str) {
        let success = self
            .store
            .update_channel_status(channel_id, using_key, ChannelStatus::Enabled, "")
            .await;
        if success {
            self.directory
                .update_status(channel_id, ChannelStatus::Enabled)
                .await;
            let subject = format!("Channel '{}' (#{}) has been enabled", channel_name, channel_id);
            let body = subject.clone();
            self.notify_once(channel_id, ChannelStatus::Enabled, &subject, &body)
                .await;
        }
    }

    /// 判断渠道是否已到期，到期时间缺失或无法解析时放行
    pub fn is_channel_expired(&self, channel: &Channel) -> bool {
        match channel.expires_at() {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }

    /// 到期禁用渠道并通知
    pub async fn disable_expired_channel(&self, channel: &Channel) {
        let Some(expired_at) = channel.expires_at() else {
            return;
        };
        let reason = format!(
            "Channel expired at {}",
            expired_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        info!(
            "Channel '{}' (#{}) has expired, about to disable: {}",
            channel.name, channel.id, reason
        );

        let success = self
            .store
            .update_channel_status(channel.id, None, ChannelStatus::ExpiredDisabled, &reason)
            .await;
        if success {
            self.directory
                .update_status(channel.id, ChannelStatus::ExpiredDisabled)
                .await;
            let subject = format!(
                "Channel '{}' (#{}) has been disabled after expiration",
                channel.name, channel.id
            );
            let body = format!(
                "Channel '{}' (#{}) has been disabled after expiration, {}",
                channel.name, channel.id, reason
            );
            self.notify_once(channel.id, ChannelStatus::ExpiredDisabled, &subject, &body)
                .await;
        }
    }

    /// 扫描全部渠道，禁用已到期的启用渠道
    pub async fn scan_expired_channels(&self) -> Result<()> {
        let channels = self.store.fetch_all_channels().await?;

        let mut expired_count = 0;
        for channel in &channels {
            // 只检查启用状态的渠道
            if channel.status.is_enabled() && self.is_channel_expired(channel) {
                self.disable_expired_channel(channel).await;
                expired_count += 1;
            }
        }

        if expired_count > 0 {
            info!(
                "Expired channel scan completed, disabled {} channels",
                expired_count
            );
        }
        Ok(())
    }

    /// 同一渠道同一状态只发一次通知，状态变化后重新解锁
    async fn notify_once(
        &self,
        channel_id: i32,
        status: ChannelStatus,
        subject: &str,
        body: &str,
    ) {
        {
            let mut last = self.last_notified.lock().await;
            if last.get(&channel_id) == Some(&status) {
                return;
            }
            last.insert(channel_id, status);
        }
        self.notifier.notify(channel_id, status, subject, body).await;
    }
}
