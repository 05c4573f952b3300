use agora_api::{
    Comment, CommentId, Cursor, NewComment, NewPost, NewReply, Page, Paginated, Post, PostId,
    Time, Uuid,
};
use anyhow::Context;
use sqlx::{postgres::PgRow, Connection};

use crate::{
    query::{self, Scope},
    Error,
};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    author: String,
    content: String,
    created_at: Time,
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Post {
        Post {
            id: PostId(r.id),
            title: r.title,
            author: r.author,
            content: r.content,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    in_reply_to_id: Option<Uuid>,
    author: String,
    content: String,
    created_at: Time,
    reply_count: i64,
    votes: i64,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Comment {
        Comment {
            id: CommentId(r.id),
            post_id: PostId(r.post_id),
            in_reply_to_id: r.in_reply_to_id.map(CommentId),
            author: r.author,
            content: r.content,
            created_at: r.created_at,
            reply_count: r.reply_count,
            votes: r.votes,
        }
    }
}

/// Runs the pagination protocol over `scope`
///
/// Both reads happen in the same snapshot, so that a concurrent insertion cannot make the
/// oldest row disagree with the page.
async fn fetch_page<R, T>(
    conn: &mut sqlx::PgConnection,
    scope: Scope,
    cursor: Option<&Cursor>,
    page_size: u32,
) -> anyhow::Result<Page<T>>
where
    R: Send + Unpin + for<'r> sqlx::FromRow<'r, PgRow>,
    T: From<R> + Paginated,
{
    let table = scope.table();
    let mut tx = conn
        .begin()
        .await
        .with_context(|| format!("starting transaction to list {scope:?}"))?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await
        .context("setting transaction isolation level")?;

    let mut sql = query::to_postgres(&scope);
    let oldest_query = sql.oldest(table);
    let oldest = sql
        .bind_all(sqlx::query_as::<_, R>(&oldest_query))
        .fetch_optional(&mut *tx)
        .await
        .with_context(|| format!("fetching oldest row of {scope:?}"))?
        .map(T::from);

    if let Some(cursor) = cursor {
        sql.add_cursor(cursor);
    }
    let page_query = sql.newest_first(table, page_size);
    let items = sql
        .bind_all(sqlx::query_as::<_, R>(&page_query))
        .fetch_all(&mut *tx)
        .await
        .with_context(|| format!("fetching page of {scope:?} after {cursor:?}"))?
        .into_iter()
        .map(T::from)
        .collect::<Vec<_>>();

    tx.commit()
        .await
        .with_context(|| format!("committing listing of {scope:?}"))?;
    Ok(Page::new(items, oldest.as_ref()))
}

pub async fn create_post(conn: &mut sqlx::PgConnection, p: NewPost) -> anyhow::Result<Post> {
    let post = sqlx::query_as::<_, PostRow>(
        "
            INSERT INTO posts (id, title, author, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, author, content, created_at
        ",
    )
    .bind(Uuid::new_v4())
    .bind(p.title)
    .bind(p.author)
    .bind(p.content)
    .fetch_one(conn)
    .await
    .context("inserting post")?;
    tracing::debug!(id = ?post.id, "created post");
    Ok(post.into())
}

pub async fn fetch_posts(
    conn: &mut sqlx::PgConnection,
    cursor: Option<&Cursor>,
    page_size: u32,
) -> anyhow::Result<Page<Post>> {
    fetch_page::<PostRow, Post>(conn, Scope::Posts, cursor, page_size).await
}

pub async fn fetch_post(conn: &mut sqlx::PgConnection, id: PostId) -> anyhow::Result<Option<Post>> {
    Ok(sqlx::query_as::<_, PostRow>(
        "SELECT id, title, author, content, created_at FROM posts WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("fetching post {id:?}"))?
    .map(Post::from))
}

pub async fn comment_post(
    conn: &mut sqlx::PgConnection,
    c: NewComment,
) -> Result<Comment, Error> {
    let post_id = c.post_id;
    // Posts are never deleted, so checking existence in the same statement is enough
    let comment = sqlx::query_as::<_, CommentRow>(
        "
            INSERT INTO comments (id, post_id, author, content)
            SELECT $1, p.id, $2, $3
                FROM posts p
            WHERE p.id = $4
            RETURNING id, post_id, in_reply_to_id, author, content, created_at, reply_count, votes
        ",
    )
    .bind(Uuid::new_v4())
    .bind(c.author)
    .bind(c.content)
    .bind(post_id.0)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("inserting comment on post {post_id:?}"))?
    .ok_or(Error::post_not_found(post_id))?;
    tracing::debug!(id = ?comment.id, ?post_id, "created comment");
    Ok(comment.into())
}

pub async fn fetch_post_comments(
    conn: &mut sqlx::PgConnection,
    post: PostId,
    cursor: Option<&Cursor>,
    page_size: u32,
) -> anyhow::Result<Page<Comment>> {
    fetch_page::<CommentRow, Comment>(conn, Scope::TopLevelComments(post), cursor, page_size)
        .await
}

/// Inserts the reply and bumps its parent's reply count as one unit
///
/// The row lock taken by the UPDATE serializes concurrent replies to the same parent.
pub async fn reply_comment(
    conn: &mut sqlx::PgConnection,
    r: NewReply,
) -> Result<Comment, Error> {
    let (post_id, parent) = (r.post_id, r.in_reply_to_id);
    let mut tx = conn.begin().await.context("starting reply transaction")?;

    let res = sqlx::query(
        "UPDATE comments SET reply_count = reply_count + 1 WHERE id = $1 AND post_id = $2",
    )
    .bind(parent.0)
    .bind(post_id.0)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("incrementing reply count of {parent:?}"))?;
    if res.rows_affected() == 0 {
        // dropping tx rolls back
        return Err(Error::comment_not_found(parent));
    }
    if res.rows_affected() != 1 {
        return Err(anyhow::anyhow!(
            "incrementing reply count of {:?} affected {} rows",
            parent,
            res.rows_affected()
        )
        .into());
    }

    let reply = sqlx::query_as::<_, CommentRow>(
        "
            INSERT INTO comments (id, post_id, in_reply_to_id, author, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, post_id, in_reply_to_id, author, content, created_at, reply_count, votes
        ",
    )
    .bind(Uuid::new_v4())
    .bind(post_id.0)
    .bind(parent.0)
    .bind(r.author)
    .bind(r.content)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("inserting reply to {parent:?}"))?;

    tx.commit()
        .await
        .with_context(|| format!("committing reply to {parent:?}"))?;
    tracing::debug!(id = ?reply.id, ?parent, "created reply");
    Ok(reply.into())
}

pub async fn fetch_comment_replies(
    conn: &mut sqlx::PgConnection,
    post: PostId,
    parent: CommentId,
    cursor: Option<&Cursor>,
    page_size: u32,
) -> anyhow::Result<Page<Comment>> {
    fetch_page::<CommentRow, Comment>(conn, Scope::Replies(post, parent), cursor, page_size).await
}

pub async fn vote_comment(
    conn: &mut sqlx::PgConnection,
    id: CommentId,
    delta: i64,
) -> Result<Comment, Error> {
    Ok(sqlx::query_as::<_, CommentRow>(
        "
            UPDATE comments SET votes = votes + $2
            WHERE id = $1
            RETURNING id, post_id, in_reply_to_id, author, content, created_at, reply_count, votes
        ",
    )
    .bind(id.0)
    .bind(delta)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("voting {delta:+} on comment {id:?}"))?
    .ok_or(Error::comment_not_found(id))?
    .into())
}
