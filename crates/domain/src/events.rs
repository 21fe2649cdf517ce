//! 推送给在线客户端的实时事件
//!
//! 序列化格式为 `{"event": "message:new", "data": {...}}`。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::notification::Notification;
use crate::user::UserSummary;
use crate::value_objects::{ConversationId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "message:new")]
    MessageNew {
        message: Message,
        sender: UserSummary,
    },
    #[serde(rename = "notification:new")]
    NotificationNew { notification: Notification },
    #[serde(rename = "typing:start")]
    TypingStart(TypingPayload),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingPayload),
    #[serde(rename = "user:online", rename_all = "camelCase")]
    UserOnline { user_id: UserId },
    #[serde(rename = "user:offline", rename_all = "camelCase")]
    UserOffline { user_id: UserId },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::MessageNew { .. } => "message:new",
            RealtimeEvent::NotificationNew { .. } => "notification:new",
            RealtimeEvent::TypingStart(_) => "typing:start",
            RealtimeEvent::TypingStop(_) => "typing:stop",
            RealtimeEvent::UserOnline { .. } => "user:online",
            RealtimeEvent::UserOffline { .. } => "user:offline",
        }
    }

    /// 输入状态等临时信号，不落库、不重试
    pub fn is_ephemeral(&self) -> bool {
        matches!(
            self,
            RealtimeEvent::TypingStart(_) | RealtimeEvent::TypingStop(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_event_wire_format() {
        let user_id = UserId::generate();
        let value = serde_json::to_value(RealtimeEvent::UserOnline { user_id }).unwrap();
        assert_eq!(value["event"], "user:online");
        assert_eq!(value["data"]["userId"], user_id.to_string());
    }

    #[test]
    fn typing_event_round_trips() {
        let event = RealtimeEvent::TypingStart(TypingPayload {
            conversation_id: ConversationId::generate(),
            user_id: UserId::generate(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"typing:start\""));
        assert!(json.contains("conversationId"));
        assert!(event.is_ephemeral());
        assert_eq!(event.name(), "typing:start");
    }
}
