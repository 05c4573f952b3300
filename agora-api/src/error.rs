use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{CommentId, PostId};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown operation {0:?}")]
    UnknownOperation(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Field {0:?} must not be empty")]
    EmptyField(String),

    #[error("Field {field:?} is longer than {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("Invalid page size {0}")]
    InvalidPageSize(u32),

    #[error("Invalid cursor {0:?}")]
    InvalidCursor(String),

    #[error("Post not found {0:?}")]
    PostNotFound(PostId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::UnknownOperation(_) => StatusCode::NOT_FOUND,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::EmptyField(_) => StatusCode::BAD_REQUEST,
            Error::FieldTooLong { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidPageSize(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCursor(_) => StatusCode::BAD_REQUEST,
            Error::PostNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Whether the caller is at fault, ie. retrying the same call cannot succeed
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::InvalidInput(msg) => json!({
                "message": msg,
                "type": "invalid-input",
            }),
            Error::UnknownOperation(op) => json!({
                "message": "unknown operation",
                "type": "unknown-operation",
                "op": op,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::EmptyField(f) => json!({
                "message": "a required field was empty",
                "type": "empty-field",
                "field": f,
            }),
            Error::FieldTooLong { field, max } => json!({
                "message": "a field exceeded its maximum length",
                "type": "field-too-long",
                "field": field,
                "max": max,
            }),
            Error::InvalidPageSize(n) => json!({
                "message": "page size is out of range",
                "type": "invalid-page-size",
                "pageSize": n,
            }),
            Error::InvalidCursor(c) => json!({
                "message": "cursor could not be parsed",
                "type": "invalid-cursor",
                "cursor": c,
            }),
            Error::PostNotFound(id) => json!({
                "message": "post not found",
                "type": "post-not-found",
                "id": id.0,
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id.0,
            }),
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        Error::from_json(&data)
    }

    pub fn from_json(data: &serde_json::Value) -> anyhow::Result<Error> {
        let str_field = |name: &str| {
            data.get(name)
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error is missing string field {name:?}"))
        };
        let uuid_field = || {
            data.get("id")
                .and_then(|id| id.as_str())
                .and_then(|id| Uuid::from_str(id).ok())
                .ok_or_else(|| anyhow!("error is missing a proper id"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(str_field("message").unwrap_or_default()),
                "invalid-input" => Error::InvalidInput(str_field("message")?),
                "unknown-operation" => Error::UnknownOperation(str_field("op")?),
                "null-byte" => Error::NullByteInString(str_field("string")?),
                "empty-field" => Error::EmptyField(str_field("field")?),
                "field-too-long" => Error::FieldTooLong {
                    field: str_field("field")?,
                    max: data
                        .get("max")
                        .and_then(|m| m.as_u64())
                        .ok_or_else(|| anyhow!("field-too-long error without a max"))?
                        as usize,
                },
                "invalid-page-size" => Error::InvalidPageSize(
                    data.get("pageSize")
                        .and_then(|n| n.as_u64())
                        .and_then(|n| u32::try_from(n).ok())
                        .ok_or_else(|| anyhow!("invalid-page-size error without a page size"))?,
                ),
                "invalid-cursor" => Error::InvalidCursor(str_field("cursor")?),
                "post-not-found" => Error::PostNotFound(PostId(uuid_field()?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(uuid_field()?)),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
