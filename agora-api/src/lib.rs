use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod call;
pub use call::{Call, CallResult};

mod comment;
pub use comment::{
    Comment, CommentId, CommentRef, CommentRepliesPage, NewComment, NewReply, PostCommentsPage,
};

mod error;
pub use error::Error;

mod page;
pub use page::{Cursor, Page, Paginated};

mod post;
pub use post::{NewPost, Post, PostId, PostRef, PostsPage, MAX_TITLE_LEN};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const MAX_AUTHOR_LEN: usize = 100;
pub const MAX_CONTENT_LEN: usize = 10_000;

// PostgreSQL refuses to store null bytes in text columns
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

pub fn validate_field(name: &str, value: &str, max_len: usize) -> Result<(), Error> {
    validate_string(value)?;
    if value.trim().is_empty() {
        return Err(Error::EmptyField(String::from(name)));
    }
    if value.chars().count() > max_len {
        return Err(Error::FieldTooLong {
            field: String::from(name),
            max: max_len,
        });
    }
    Ok(())
}

pub fn validate_page_size(page_size: Option<u32>) -> Result<(), Error> {
    match page_size {
        Some(n) if n == 0 || n > MAX_PAGE_SIZE => Err(Error::InvalidPageSize(n)),
        _ => Ok(()),
    }
}
