use std::{ops::ControlFlow, sync::Arc};

use application::ConnectionRegistry;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ConnectionId, ConversationId, RealtimeEvent, TypingPayload, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::state::AppState;

/// 客户端可以发送的帧
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientFrame {
    #[serde(rename = "typing:start")]
    TypingStart(TypingSignal),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingSignal),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingSignal {
    conversation_id: ConversationId,
    recipient_id: UserId,
}

impl ClientFrame {
    /// 转换成发给收件人的事件，发送者身份取自连接而不是帧内容
    fn into_event(self, user_id: UserId) -> (UserId, RealtimeEvent) {
        match self {
            ClientFrame::TypingStart(signal) => (
                signal.recipient_id,
                RealtimeEvent::TypingStart(TypingPayload {
                    conversation_id: signal.conversation_id,
                    user_id,
                }),
            ),
            ClientFrame::TypingStop(signal) => (
                signal.recipient_id,
                RealtimeEvent::TypingStop(TypingPayload {
                    conversation_id: signal.conversation_id,
                    user_id,
                }),
            ),
        }
    }
}

/// WebSocket 连接
///
/// 连接建立后加入用户房间，断开时离开。负责：
/// - 把注册表推送的事件写给客户端
/// - 转发客户端的输入状态信号
/// - 心跳回应
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        Self {
            socket,
            state,
            user_id,
            connection_id: ConnectionId::generate(),
        }
    }

    /// 运行连接主循环，直到任一方向结束
    pub async fn run(self) {
        let Self {
            socket,
            state,
            user_id,
            connection_id,
        } = self;
        let registry = state.registry.clone();

        let (event_tx, mut event_rx) = mpsc::channel::<RealtimeEvent>(state.connection_buffer);
        if let Err(err) = registry.join(connection_id, user_id, event_tx) {
            tracing::error!(error = %err, user_id = %user_id, "连接注册失败");
            return;
        }
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已建立");

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = event_rx.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, event = event.name(), "事件序列化失败");
                            continue;
                        }
                    },
                    else => break,
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!("写入 WebSocket 失败，客户端已断开");
                    break;
                }
            }
        });

        // 接收任务：处理来自客户端的消息
        let mut recv_task = {
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    let flow =
                        handle_incoming(message, &cmd_tx, &registry, connection_id, user_id).await;
                    if flow.is_break() {
                        break;
                    }
                }
            })
        };

        // 任意一个方向结束即视为断开
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        registry.leave(connection_id);
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已断开");
    }
}

/// 处理来自客户端的消息
async fn handle_incoming(
    message: WsMessage,
    cmd_tx: &mpsc::Sender<WsCommand>,
    registry: &Arc<ConnectionRegistry>,
    connection_id: ConnectionId,
    user_id: UserId,
) -> ControlFlow<()> {
    match message {
        WsMessage::Close(_) => {
            tracing::debug!(user_id = %user_id, "WebSocket 收到关闭消息");
            return ControlFlow::Break(());
        }
        WsMessage::Ping(data) => {
            if cmd_tx
                .send(WsCommand::SendPong(data.to_vec()))
                .await
                .is_err()
            {
                return ControlFlow::Break(());
            }
        }
        WsMessage::Pong(_) | WsMessage::Binary(_) => {}
        WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => {
                let (recipient_id, event) = frame.into_event(user_id);
                let delivered = registry.relay(connection_id, recipient_id, event);
                tracing::trace!(user_id = %user_id, recipient_id = %recipient_id, delivered, "输入状态已转发");
            }
            Err(err) => {
                tracing::debug!(user_id = %user_id, error = %err, "忽略无法识别的客户端帧");
            }
        },
    }
    ControlFlow::Continue(())
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
