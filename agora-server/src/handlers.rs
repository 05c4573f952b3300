use agora_api::{Call, CallResult};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

use crate::{db, extractors::*, Error};

/// Executes one already-validated call
pub async fn run_call(
    conn: &mut sqlx::PgConnection,
    page_size: PageSize,
    call: Call,
) -> Result<serde_json::Value, Error> {
    let op = call.name();
    tracing::debug!(op, "running call");
    macro_rules! to_json {
        ($e:expr) => {
            serde_json::to_value($e)
                .with_context(|| format!("serializing result of {op}"))?
        };
    }
    Ok(match call {
        Call::CreatePost(p) => to_json!(db::create_post(conn, p).await?),
        Call::GetPosts(q) => to_json!(
            db::fetch_posts(conn, q.cursor.as_ref(), page_size.or(q.page_size)).await?
        ),
        Call::GetPost(q) => to_json!(db::fetch_post(conn, q.id).await?),
        Call::CommentPost(c) => to_json!(db::comment_post(conn, c).await?),
        Call::GetPostComments(q) => to_json!(
            db::fetch_post_comments(
                conn,
                q.post_id,
                q.cursor.as_ref(),
                page_size.or(q.page_size)
            )
            .await?
        ),
        Call::ReplyComment(r) => to_json!(db::reply_comment(conn, r).await?),
        Call::GetCommentReplies(q) => to_json!(
            db::fetch_comment_replies(
                conn,
                q.post_id,
                q.in_reply_to_id,
                q.cursor.as_ref(),
                page_size.or(q.page_size)
            )
            .await?
        ),
        Call::UpVotePost(c) => to_json!(db::vote_comment(conn, c.id, 1).await?),
        Call::DownVotePost(c) => to_json!(db::vote_comment(conn, c.id, -1).await?),
    })
}

/// `POST /api/:op`, the body being the operation's input
pub async fn single_call(
    State(db): State<PgPool>,
    State(page_size): State<PageSize>,
    Path(op): Path<String>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, Error> {
    let input = match body.is_empty() {
        true => serde_json::json!({}),
        false => serde_json::from_slice(&body).map_err(Error::invalid_input)?,
    };
    let call = Call::parse(&op, input)?;
    let mut conn = db.acquire().await?;
    Ok(Json(run_call(&mut conn, page_size, call).await?))
}

/// `POST /api/batch`, the body being a list of `{"op": ..., "input": ...}` calls
///
/// Calls run in order, each as its own unit of work: one failing does not prevent the
/// following ones from running.
pub async fn batch(
    State(db): State<PgPool>,
    State(page_size): State<PageSize>,
    body: Bytes,
) -> Result<Json<Vec<CallResult>>, Error> {
    let calls: Vec<serde_json::Value> =
        serde_json::from_slice(&body).map_err(Error::invalid_input)?;
    tracing::debug!(num_calls = calls.len(), "running batch");
    let calls = calls.into_iter().map(Call::from_json).collect::<Vec<_>>();
    if calls.iter().all(Result::is_err) {
        // no need to touch the store at all
        return Ok(Json(
            calls
                .into_iter()
                .filter_map(Result::err)
                .map(|e| CallResult::Error(e.to_json()))
                .collect(),
        ));
    }
    let mut conn = db.acquire().await?;
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        let res = match call {
            Err(e) => Err(e),
            Ok(call) => run_call(&mut conn, page_size, call)
                .await
                .map_err(Error::into_api),
        };
        results.push(CallResult::from(res));
    }
    Ok(Json(results))
}
