use thiserror::Error;

/// 路由核心错误类型
#[derive(Error, Debug)]
pub enum RouteError {
    /// 别名解析和名称归一化之后仍然没有候选渠道
    #[error("no available channel for model '{model}' in group '{group}'")]
    ChannelNotFound { group: String, model: String },
    /// 请求了 auto 分组但没有配置任何回退分组
    #[error("auto groups are not enabled")]
    AutoGroupUnavailable,
    /// 选中的渠道支持的模型与映射目标没有交集
    #[error("no acceptable model left after global model mapping for '{model}'")]
    NoAcceptableModel { model: String },
    /// 候选列表中的 id 不在 id 映射里，属于数据一致性错误
    #[error(
        "channel directory inconsistency: channel #{channel_id} is indexed but missing from the id map, please contact the administrator"
    )]
    DirectoryInconsistency { channel_id: i32 },
    /// 按 id 查询时渠道已经不存在
    #[error("channel #{channel_id} no longer exists")]
    ChannelMissing { channel_id: i32 },
    /// 空候选列表传进了选择器，调用方应当先行短路
    #[error("candidate channel list is empty")]
    EmptyCandidates,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// 中继层归一化后的上游调用错误，供生命周期管理分类使用
///
/// 这里只承载分类需要的字段，不关心上游的具体线协议。
#[derive(Debug, Clone, Default)]
pub struct UpstreamError {
    /// 上游返回的 HTTP 状态码，0 表示传输层失败
    pub status_code: u16,
    /// 上游错误体里的 code 字段
    pub code: Option<String>,
    /// 上游错误体里的 type 字段
    pub kind: Option<String>,
    pub message: String,
    /// 上游明确标记的渠道级错误
    pub channel_error: bool,
    /// 传输层的跳过重试错误，不参与封禁判定
    pub skip_retry: bool,
}

impl UpstreamError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn channel_error(mut self) -> Self {
        self.channel_error = true;
        self
    }

    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream error (status {}): {}", self.status_code, self.message)
    }
}

impl std::error::Error for UpstreamError {}
