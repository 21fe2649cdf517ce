//! 论坛讨论与回复
//!
//! 讨论和回复的增删改由外部 CRUD 层负责，这里只保留点赞需要的字段。

use serde::{Deserialize, Serialize};

use crate::reaction::{Reactable, SubjectRef};
use crate::value_objects::{DiscussionId, ReplyId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: DiscussionId,
    pub author_id: UserId,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Discussion {
    pub fn reactable(&self) -> Reactable {
        Reactable {
            subject: SubjectRef::discussion(self.id),
            author_id: self.author_id,
            discussion_id: self.id,
            discussion_title: self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: ReplyId,
    pub discussion_id: DiscussionId,
    pub author_id: UserId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

impl Reply {
    pub fn reactable(&self, discussion: &Discussion) -> Reactable {
        Reactable {
            subject: SubjectRef::reply(self.id),
            author_id: self.author_id,
            discussion_id: discussion.id,
            discussion_title: discussion.title.clone(),
        }
    }
}
