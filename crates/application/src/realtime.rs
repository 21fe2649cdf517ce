//! 实时连接注册表
//!
//! 每个在线用户对应一个 `user:{id}` 房间，房间里是该用户的全部连接。
//! 推送是尽力而为的：用户不在线或发送队列已满时事件直接丢弃，不重试、不落库。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domain::{ConnectionId, RealtimeEvent, UserId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 每个连接的出站事件队列
pub type EventSender = mpsc::Sender<RealtimeEvent>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("connection {0} is already registered")]
    ConnectionAlreadyRegistered(ConnectionId),
}

/// 向某个用户的所有在线连接推送事件。
///
/// 返回实际投递成功的连接数，0 表示用户当前不可达。
#[cfg_attr(test, mockall::automock)]
pub trait UserEventSink: Send + Sync {
    fn deliver_to_user(&self, user_id: UserId, event: RealtimeEvent) -> usize;
}

/// 用户房间名
pub fn user_room(user_id: UserId) -> String {
    format!("user:{user_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    pub user_id: UserId,
    pub first_connection: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub user_id: UserId,
    pub last_connection: bool,
}

/// 进程内连接注册表
///
/// `connections` 记录连接归属的用户；`rooms` 按用户分组保存连接的发送端。
/// 同一用户的房间变更和上下线广播都在该用户的 `presence` 锁内完成，
/// 其他连接看到的最后一个上下线事件总与房间的最终状态一致。
/// 加锁顺序固定为 `connections`、`presence`、`rooms`，且不持有分片锁去广播。
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, UserId>,
    presence: DashMap<UserId, Arc<Mutex<()>>>,
    rooms: DashMap<UserId, HashMap<ConnectionId, EventSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 连接加入所属用户的房间，并向其他在线用户广播 `user:online`。
    ///
    /// 一个连接在生命周期内只属于一个用户，重复注册会被拒绝。
    pub fn join(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        sender: EventSender,
    ) -> Result<Arrival, RealtimeError> {
        match self.connections.entry(connection_id) {
            Entry::Occupied(_) => {
                return Err(RealtimeError::ConnectionAlreadyRegistered(connection_id));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(user_id);
            }
        }

        let presence = self.presence_lock(user_id);
        let _guard = lock_presence(&presence);
        let first_connection = {
            let mut room = self.rooms.entry(user_id).or_default();
            let first = room.is_empty();
            room.insert(connection_id, sender);
            first
        };

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            room = %user_room(user_id),
            first_connection,
            "连接已加入用户房间"
        );

        let delivered = self.broadcast_except(user_id, RealtimeEvent::UserOnline { user_id });
        debug!(user_id = %user_id, delivered, "已广播上线事件");

        Ok(Arrival {
            user_id,
            first_connection,
        })
    }

    /// 移除连接；用户最后一个连接断开时广播 `user:offline`。
    ///
    /// 未知连接返回 `None`。
    pub fn leave(&self, connection_id: ConnectionId) -> Option<Departure> {
        let (_, user_id) = self.connections.remove(&connection_id)?;

        let presence = self.presence_lock(user_id);
        let _guard = lock_presence(&presence);
        let last_connection = match self.rooms.entry(user_id) {
            Entry::Occupied(mut room) => {
                room.get_mut().remove(&connection_id);
                if room.get().is_empty() {
                    room.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if last_connection {
            let delivered = self.broadcast_except(user_id, RealtimeEvent::UserOffline { user_id });
            info!(user_id = %user_id, delivered, "用户最后一个连接已断开");
        } else {
            debug!(user_id = %user_id, connection_id = %connection_id, "连接已断开，用户仍在线");
        }

        Some(Departure {
            user_id,
            last_connection,
        })
    }

    /// 转发输入状态等临时事件给收件人。
    ///
    /// 发起连接未注册或事件不是临时事件时丢弃，返回投递数量。
    pub fn relay(&self, from: ConnectionId, recipient_id: UserId, event: RealtimeEvent) -> usize {
        let Some(sender_id) = self.user_of(from) else {
            debug!(connection_id = %from, event = event.name(), "未注册的连接，丢弃转发事件");
            return 0;
        };

        if !event.is_ephemeral() {
            warn!(
                user_id = %sender_id,
                event = event.name(),
                "只允许客户端转发临时事件"
            );
            return 0;
        }

        self.deliver_to_user(recipient_id, event)
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.connections.get(&connection_id).map(|entry| *entry)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.rooms
            .get(&user_id)
            .map(|room| !room.is_empty())
            .unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn presence_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.presence.entry(user_id).or_default().clone()
    }

    fn senders_of(&self, user_id: UserId) -> Vec<(ConnectionId, EventSender)> {
        self.rooms
            .get(&user_id)
            .map(|room| {
                room.iter()
                    .map(|(connection_id, sender)| (*connection_id, sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn broadcast_except(&self, excluded: UserId, event: RealtimeEvent) -> usize {
        let targets: Vec<(UserId, Vec<(ConnectionId, EventSender)>)> = self
            .rooms
            .iter()
            .filter(|entry| *entry.key() != excluded)
            .map(|entry| {
                let senders = entry
                    .value()
                    .iter()
                    .map(|(connection_id, sender)| (*connection_id, sender.clone()))
                    .collect();
                (*entry.key(), senders)
            })
            .collect();

        targets
            .into_iter()
            .map(|(user_id, senders)| send_all(user_id, senders, &event))
            .sum()
    }
}

impl UserEventSink for ConnectionRegistry {
    fn deliver_to_user(&self, user_id: UserId, event: RealtimeEvent) -> usize {
        let senders = self.senders_of(user_id);
        if senders.is_empty() {
            debug!(user_id = %user_id, event = event.name(), "用户不在线，事件丢弃");
            return 0;
        }
        send_all(user_id, senders, &event)
    }
}

fn lock_presence(presence: &Mutex<()>) -> MutexGuard<'_, ()> {
    presence.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn send_all(
    user_id: UserId,
    senders: Vec<(ConnectionId, EventSender)>,
    event: &RealtimeEvent,
) -> usize {
    let mut delivered = 0;
    for (connection_id, sender) in senders {
        match sender.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    event = event.name(),
                    "连接发送队列已满，事件丢弃"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    event = event.name(),
                    "连接已关闭，事件丢弃"
                );
            }
        }
    }
    delivered
}
