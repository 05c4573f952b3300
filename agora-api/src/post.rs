use uuid::Uuid;

use crate::{Cursor, Error, Paginated, Time, STUB_UUID};

pub const MAX_TITLE_LEN: usize = 300;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub author: String,
    pub content: String,
    pub created_at: Time,
}

impl Paginated for Post {
    fn position(&self) -> Cursor {
        Cursor::new(self.created_at, self.id.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub title: String,
    pub author: String,
    pub content: String,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_field("title", &self.title, MAX_TITLE_LEN)?;
        crate::validate_field("author", &self.author, crate::MAX_AUTHOR_LEN)?;
        crate::validate_field("content", &self.content, crate::MAX_CONTENT_LEN)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl PostsPage {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_page_size(self.page_size)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostRef {
    pub id: PostId,
}
