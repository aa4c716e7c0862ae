use async_trait::async_trait;
use domain::PushSubscription;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    /// 端点已失效（410/404 一类），可以作为清除订阅的依据
    #[error("endpoint gone: {endpoint}")]
    EndpointGone { endpoint: String },
    /// 网络或服务端临时故障
    #[error("delivery failed: {message}")]
    Delivery { message: String },
}

impl PushError {
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }
}

/// 单个推送端点的投递接口。
///
/// 外部推送服务不可靠，调用方必须把失败当作常态处理，
/// 绝不因为单个端点失败而影响其他端点。
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &str) -> Result<(), PushError>;
}
