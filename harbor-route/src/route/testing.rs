use anyhow::Result;
use async_trait::async_trait;
use harbor_core::{
    Ability, Channel, ChannelInfo, ChannelKind, ChannelNotifier, ChannelSettings, ChannelStatus,
    ChannelStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn test_channel(
    id: i32,
    name: &str,
    groups: &[&str],
    models: &[&str],
    priority: i64,
    weight: u32,
) -> Channel {
    Channel {
        id,
        name: name.to_string(),
        kind: ChannelKind::OpenAI,
        status: ChannelStatus::Enabled,
        groups: groups.iter().map(|g| g.to_string()).collect(),
        models: models.iter().map(|m| m.to_string()).collect(),
        priority,
        weight,
        model_mapping: Default::default(),
        info: ChannelInfo::default(),
        keys: Vec::new(),
        settings: ChannelSettings::default(),
    }
}

pub fn ability(group: &str, model: &str, channel_id: i32) -> Ability {
    Ability {
        group: group.to_string(),
        model: model.to_string(),
        channel_id,
    }
}

/// 测试用内存存储
pub struct MemoryStore {
    pub channels: Mutex<Vec<Channel>>,
    pub abilities: Mutex<Vec<Ability>>,
    pub fail_fetch: AtomicBool,
    pub update_result: AtomicBool,
    pub status_updates: Mutex<Vec<(i32, ChannelStatus, String)>>,
}

impl MemoryStore {
    pub fn new(channels: Vec<Channel>, abilities: Vec<Ability>) -> Self {
        Self {
            channels: Mutex::new(channels),
            abilities: Mutex::new(abilities),
            fail_fetch: AtomicBool::new(false),
            update_result: AtomicBool::new(true),
            status_updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn fetch_all_channels(&self) -> Result<Vec<Channel>> {
        if self.fail_fetch.load(Ordering::Relaxed) {
            anyhow::bail!("store unavailable");
        }
        Ok(self.channels.lock().unwrap().clone())
    }

    async fn fetch_all_abilities(&self) -> Result<Vec<Ability>> {
        if self.fail_fetch.load(Ordering::Relaxed) {
            anyhow::bail!("store unavailable");
        }
        Ok(self.abilities.lock().unwrap().clone())
    }

    async fn fetch_channel_by_id(&self, id: i32) -> Result<Channel> {
        self.channels
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("channel #{} not found", id))
    }

    async fn update_channel_status(
        &self,
        id: i32,
        _key_hint: Option<&str>,
        status: ChannelStatus,
        reason: &str,
    ) -> bool {
        if !self.update_result.load(Ordering::Relaxed) {
            return false;
        }
        self.status_updates
            .lock()
            .unwrap()
            .push((id, status, reason.to_string()));
        if let Some(channel) = self.channels.lock().unwrap().iter_mut().find(|c| c.id == id) {
            channel.status = status;
        }
        true
    }
}

/// 测试用通知记录器
#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<(i32, ChannelStatus, String, String)>>,
}

#[async_trait]
impl ChannelNotifier for RecordingNotifier {
    async fn notify(&self, channel_id: i32, status: ChannelStatus, subject: &str, body: &str) {
        self.notifications.lock().unwrap().push((
            channel_id,
            status,
            subject.to_string(),
            body.to_string(),
        ));
    }
}
