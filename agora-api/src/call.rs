use serde_json::json;

use crate::{
    CommentRef, CommentRepliesPage, Cursor, Error, NewComment, NewPost, NewReply, PostCommentsPage,
    PostRef, PostsPage,
};

/// One RPC call, as sent on the wire: `{"op": "getPosts", "input": {...}}`
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "op", content = "input", rename_all = "camelCase")]
pub enum Call {
    CreatePost(NewPost),
    GetPosts(PostsPage),
    GetPost(PostRef),
    CommentPost(NewComment),
    GetPostComments(PostCommentsPage),
    ReplyComment(NewReply),
    GetCommentReplies(CommentRepliesPage),
    UpVotePost(CommentRef),
    DownVotePost(CommentRef),
}

impl Call {
    pub const NAMES: [&'static str; 9] = [
        "createPost",
        "getPosts",
        "getPost",
        "commentPost",
        "getPostComments",
        "replyComment",
        "getCommentReplies",
        "upVotePost",
        "downVotePost",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Call::CreatePost(_) => "createPost",
            Call::GetPosts(_) => "getPosts",
            Call::GetPost(_) => "getPost",
            Call::CommentPost(_) => "commentPost",
            Call::GetPostComments(_) => "getPostComments",
            Call::ReplyComment(_) => "replyComment",
            Call::GetCommentReplies(_) => "getCommentReplies",
            Call::UpVotePost(_) => "upVotePost",
            Call::DownVotePost(_) => "downVotePost",
        }
    }

    pub fn is_mutation(&self) -> bool {
        match self {
            Call::CreatePost(_)
            | Call::CommentPost(_)
            | Call::ReplyComment(_)
            | Call::UpVotePost(_)
            | Call::DownVotePost(_) => true,
            Call::GetPosts(_)
            | Call::GetPost(_)
            | Call::GetPostComments(_)
            | Call::GetCommentReplies(_) => false,
        }
    }

    // Everything not checked here is either enforced by the types or by the store
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Call::CreatePost(p) => p.validate(),
            Call::GetPosts(p) => p.validate(),
            Call::GetPost(_) => Ok(()),
            Call::CommentPost(c) => c.validate(),
            Call::GetPostComments(p) => p.validate(),
            Call::ReplyComment(r) => r.validate(),
            Call::GetCommentReplies(p) => p.validate(),
            Call::UpVotePost(_) | Call::DownVotePost(_) => Ok(()),
        }
    }

    /// Builds a call out of an operation name and its raw input, validating both
    pub fn parse(op: &str, input: serde_json::Value) -> Result<Call, Error> {
        if !Call::NAMES.contains(&op) {
            return Err(Error::UnknownOperation(String::from(op)));
        }
        Call::from_json(json!({ "op": op, "input": input }))
    }

    /// Parses one element of a batch, validating it
    pub fn from_json(call: serde_json::Value) -> Result<Call, Error> {
        if let Some(op) = call.get("op").and_then(|op| op.as_str()) {
            if !Call::NAMES.contains(&op) {
                return Err(Error::UnknownOperation(String::from(op)));
            }
        }
        if let Some(cursor) = call.pointer("/input/cursor").and_then(|c| c.as_str()) {
            cursor.parse::<Cursor>()?;
        }
        let call: Call =
            serde_json::from_value(call).map_err(|e| Error::InvalidInput(e.to_string()))?;
        call.validate()?;
        Ok(call)
    }
}

/// Outcome of one call of a batch
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CallResult {
    Result(serde_json::Value),
    Error(serde_json::Value),
}

impl CallResult {
    pub fn into_result(self) -> Result<serde_json::Value, Error> {
        match self {
            CallResult::Result(v) => Ok(v),
            CallResult::Error(e) => Err(Error::from_json(&e)
                .unwrap_or_else(|err| Error::Unknown(format!("unparseable error {e}: {err}")))),
        }
    }
}

impl From<Result<serde_json::Value, Error>> for CallResult {
    fn from(r: Result<serde_json::Value, Error>) -> CallResult {
        match r {
            Ok(v) => CallResult::Result(v),
            Err(e) => CallResult::Error(e.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PostId;

    #[test]
    fn names_match_wire_tags() {
        let call = Call::GetPost(PostRef { id: PostId::stub() });
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["op"], call.name());
        assert!(Call::NAMES.contains(&call.name()));
        assert_eq!(Call::from_json(json).unwrap(), call);
    }

    #[test]
    fn optional_inputs_may_be_omitted() {
        assert_eq!(
            Call::parse("getPosts", json!({})).unwrap(),
            Call::GetPosts(PostsPage::default())
        );
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert_eq!(
            Call::parse("deletePost", json!({})),
            Err(Error::UnknownOperation(String::from("deletePost")))
        );
        assert_eq!(
            Call::from_json(json!({"op": "getReplies", "input": {}})),
            Err(Error::UnknownOperation(String::from("getReplies")))
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            Call::parse("createPost", json!({"title": "no author"})),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Call::parse("getPosts", json!({"cursor": 3})),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Call::from_json(json!(["createPost"])),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn bad_cursor_is_reported_as_such() {
        assert_eq!(
            Call::parse("getPosts", json!({ "cursor": "yesterday" })),
            Err(Error::InvalidCursor(String::from("yesterday")))
        );
    }

    #[test]
    fn validation_runs_on_parse() {
        assert_eq!(
            Call::parse("getPosts", json!({"pageSize": 0})),
            Err(Error::InvalidPageSize(0))
        );
        assert_eq!(
            Call::parse(
                "createPost",
                json!({"title": " ", "author": "a", "content": "c"})
            ),
            Err(Error::EmptyField(String::from("title")))
        );
    }

    #[test]
    fn mutations_are_flagged() {
        let id = crate::CommentId::stub();
        assert!(Call::UpVotePost(CommentRef { id }).is_mutation());
        assert!(!Call::GetPosts(PostsPage::default()).is_mutation());
    }

    #[test]
    fn call_result_carries_errors() {
        let err = Error::PostNotFound(PostId::stub());
        let res = CallResult::from(Err(err.clone()));
        let json = serde_json::to_string(&res).unwrap();
        let back: CallResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_result(), Err(err));
    }
}
