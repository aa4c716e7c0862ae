use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use application::PresenceUpdate;
use domain::{ConnectionId, StatusPreference, UserId};

use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 封装单个实时连接的完整生命周期：
/// - 注册到连接注册表并触发在线状态重算
/// - 转发全局在线状态事件
/// - 处理客户端事件（心跳、状态偏好变更）
/// - 断开时注销连接并再次重算
pub struct WebSocketConnection {
    socket: Option<WebSocket>,
    state: AppState,
    user_id: UserId,
    connection_id: ConnectionId,
    updates: Option<broadcast::Receiver<PresenceUpdate>>,
}

impl WebSocketConnection {
    /// 建立连接：先订阅事件流，再注册连接，保证不漏掉
    /// 本次连接自身触发的上线事件。
    pub async fn new(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        let connection_id = ConnectionId::generate();
        let updates = state.broadcaster.subscribe();

        state.registry.add_connection(user_id, connection_id).await;
        state.presence_service.sync(user_id).await;

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已建立");

        Self {
            socket: Some(socket),
            state,
            user_id,
            connection_id,
            updates: Some(updates),
        }
    }

    /// 运行连接主循环，直到任一方向断开。
    pub async fn run(mut self) {
        let socket = self.socket.take().expect("Socket should be available");
        let mut updates = self
            .updates
            .take()
            .expect("Update stream should be available");

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let send_task = {
            let cmd_tx_for_updates = cmd_tx.clone();

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(cmd) = cmd_rx.recv() => {
                            match cmd {
                                WsCommand::SendText(text) => {
                                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                                        tracing::warn!("Failed to send text message");
                                        break;
                                    }
                                }
                                WsCommand::SendPong(data) => {
                                    if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                        tracing::warn!("Failed to send pong message");
                                        break;
                                    }
                                }
                            }
                        }
                        // 转发在线状态事件
                        update = updates.recv() => {
                            let update = match update {
                                Ok(update) => update,
                                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                    tracing::warn!(skipped, "presence update stream lagged");
                                    continue;
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            };
                            let event = ServerEvent::OnlineStatus {
                                user_id: update.user_id.into(),
                                online: update.online,
                            };
                            let payload = match serde_json::to_string(&event) {
                                Ok(json) => json,
                                Err(err) => {
                                    tracing::warn!(error = %err, "failed to serialize websocket payload");
                                    continue;
                                }
                            };
                            if cmd_tx_for_updates.send(WsCommand::SendText(payload)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                tracing::debug!("WebSocket发送任务结束");
            })
        };

        // 接收任务：处理来自WebSocket客户端的消息
        let recv_task = {
            let state = self.state.clone();
            let user_id = self.user_id;

            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if (Self::handle_incoming(message, &cmd_tx, &state, user_id).await).is_err() {
                        break;
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 任意一个任务结束即视为连接断开
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }

        // 注销连接并重算在线状态
        self.state
            .registry
            .remove_connection(self.user_id, self.connection_id)
            .await;
        self.state.presence_service.sync(self.user_id).await;

        tracing::info!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocket 连接已断开，在线状态已重算"
        );
    }

    /// 处理来自客户端的单条消息。返回 Err 表示连接应当结束。
    async fn handle_incoming(
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
        state: &AppState,
        user_id: UserId,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {
                tracing::debug!("收到pong消息");
            }
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::debug!(error = %err, "unrecognized client event");
                        return Self::send_event(
                            cmd_tx,
                            &ServerEvent::Error {
                                code: "BAD_EVENT",
                                message: "unrecognized event".into(),
                            },
                        )
                        .await;
                    }
                };
                return Self::handle_event(event, cmd_tx, state, user_id).await;
            }
            WsMessage::Binary(_) => {
                tracing::debug!("忽略二进制消息");
            }
        }
        Ok(())
    }

    async fn handle_event(
        event: ClientEvent,
        cmd_tx: &mpsc::Sender<WsCommand>,
        state: &AppState,
        user_id: UserId,
    ) -> Result<(), ()> {
        match event {
            ClientEvent::Ping => Self::send_event(cmd_tx, &ServerEvent::Pong).await,
            ClientEvent::SetStatus { status } => {
                if let Err(err) = state
                    .presence_service
                    .set_status_preference(user_id, status)
                    .await
                {
                    tracing::warn!(error = %err, user_id = %user_id, "failed to update status preference");
                    return Self::send_event(
                        cmd_tx,
                        &ServerEvent::Error {
                            code: "STATUS_UPDATE_FAILED",
                            message: "could not update status preference".into(),
                        },
                    )
                    .await;
                }
                Ok(())
            }
        }
    }

    async fn send_event(
        cmd_tx: &mpsc::Sender<WsCommand>,
        event: &ServerEvent,
    ) -> Result<(), ()> {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                return Ok(());
            }
        };
        cmd_tx
            .send(WsCommand::SendText(payload))
            .await
            .map_err(|_| ())
    }
}

/// WebSocket 写操作命令
///
/// 使用命令模式统一管理所有对 WebSocket sender 的写操作
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Vec<u8>),
}

/// 客户端发来的事件。
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientEvent {
    Ping,
    SetStatus { status: StatusPreference },
}

/// 服务端推送的事件。
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    OnlineStatus { user_id: Uuid, online: bool },
    Pong,
    Error { code: &'static str, message: String },
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        tracing::debug!(
            user_id = %self.user_id,
            connection_id = %self.connection_id,
            "WebSocketConnection 被销毁"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_status_event_uses_camel_case_fields() {
        let event = ServerEvent::OnlineStatus {
            user_id: Uuid::nil(),
            online: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "onlineStatus");
        assert_eq!(json["userId"], Uuid::nil().to_string());
        assert_eq!(json["online"], true);
    }

    #[test]
    fn set_status_event_parses() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"setStatus","status":"offline"}"#).unwrap();
        match event {
            ClientEvent::SetStatus { status } => assert_eq!(status, StatusPreference::Offline),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
