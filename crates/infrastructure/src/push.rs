//! 推送端点的 HTTP 投递实现。
//!
//! 把序列化好的载荷 POST 到订阅端点，由推送服务转发给浏览器。
//! 这里不做重试：失败的语义由上层的扇出逻辑决定。

use std::time::Duration;

use application::{PushError, PushSender};
use async_trait::async_trait;
use config::PushConfig;
use domain::PushSubscription;
use reqwest::StatusCode;

pub struct HttpPushSender {
    client: reqwest::Client,
    ttl_seconds: u32,
}

impl HttpPushSender {
    pub fn new(config: &PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| PushError::delivery(err.to_string()))?;
        Ok(Self {
            client,
            ttl_seconds: config.ttl_seconds,
        })
    }
}

#[async_trait]
impl PushSender for HttpPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &str) -> Result<(), PushError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_seconds)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|err| PushError::delivery(err.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // 端点已被浏览器注销
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::EndpointGone {
                endpoint: subscription.endpoint.clone(),
            }),
            status => Err(PushError::delivery(format!(
                "push service responded with {status}"
            ))),
        }
    }
}
