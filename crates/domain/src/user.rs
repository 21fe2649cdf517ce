use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{Timestamp, UserEmail, UserId};

/// 平台角色，封闭集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Member,
    Admin,
    Moderator,
    Company,
}

/// 角色授予的能力。授权检查只判断能力是否在角色的能力集合中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SendMessages,
    React,
    ModerateForum,
    ManageUsers,
}

impl UserRole {
    pub fn capabilities(&self) -> &'static [Capability] {
        use Capability::*;
        match self {
            UserRole::Member | UserRole::Company => &[SendMessages, React],
            UserRole::Moderator => &[SendMessages, React, ModerateForum],
            UserRole::Admin => &[SendMessages, React, ModerateForum, ManageUsers],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Member => "member",
            UserRole::Admin => "admin",
            UserRole::Moderator => "moderator",
            UserRole::Company => "company",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "member" => Ok(UserRole::Member),
            "admin" => Ok(UserRole::Admin),
            "moderator" => Ok(UserRole::Moderator),
            "company" => Ok(UserRole::Company),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: UserEmail,
    pub name: String,
    pub role: UserRole,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl User {
    pub fn new(id: UserId, email: UserEmail, name: impl Into<String>, role: UserRole, now: Timestamp) -> Self {
        Self {
            id,
            email,
            name: name.into(),
            role,
            created_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// 推送给客户端的用户摘要，不包含邮箱。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
}
