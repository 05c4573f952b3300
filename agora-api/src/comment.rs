use uuid::Uuid;

use crate::{Cursor, Error, Paginated, PostId, Time, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,

    /// `None` for top-level comments
    pub in_reply_to_id: Option<CommentId>,

    pub author: String,
    pub content: String,
    pub created_at: Time,

    /// Number of direct replies
    pub reply_count: i64,

    pub votes: i64,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.in_reply_to_id.is_some()
    }
}

impl Paginated for Comment {
    fn position(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: PostId,
    pub author: String,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_field("author", &self.author, crate::MAX_AUTHOR_LEN)?;
        crate::validate_field("content", &self.content, crate::MAX_CONTENT_LEN)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReply {
    pub post_id: PostId,
    pub in_reply_to_id: CommentId,
    pub author: String,
    pub content: String,
}

impl NewReply {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_field("author", &self.author, crate::MAX_AUTHOR_LEN)?;
        crate::validate_field("content", &self.content, crate::MAX_CONTENT_LEN)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommentsPage {
    pub post_id: PostId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl PostCommentsPage {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_page_size(self.page_size)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRepliesPage {
    pub post_id: PostId,
    pub in_reply_to_id: CommentId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl CommentRepliesPage {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_page_size(self.page_size)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentRef {
    pub id: CommentId,
}
