#![cfg(test)]

use agora_api::{
    Call, CallResult, Comment, CommentId, CommentRef, CommentRepliesPage, Cursor,
    Error as ApiError, NewComment, NewPost, NewReply, Page, Post, PostCommentsPage, PostId,
    PostRef, PostsPage, DEFAULT_PAGE_SIZE,
};
use agora_mock_server::MockServer;
use async_recursion::async_recursion;
use bolero::generator::TypeGenerator;
use axum::http::{self, request};
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    Some(postgresfixture::cluster::Cluster::new(data, runtime?))
}

/// Spins up a throwaway postgresql cluster with migrations applied, and runs `test` on it
///
/// Skips the test if postgresql is not installed.
fn with_pg_pool(name: &str, test: impl FnOnce(&tokio::runtime::Runtime, PgPool)) {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    let lockfile = tempfile::tempfile().expect("creating tempfile");
    let datadir = tempfile::tempdir().expect("creating tempdir");
    let datadir_path: &Path = datadir.as_ref();
    let cluster = match build_pg_cluster(datadir_path) {
        Some(cluster) => cluster,
        None => {
            eprintln!("postgresql seems to not be installed in path, skipping {name}");
            return;
        }
    };
    let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
    postgresfixture::coordinate::run_and_destroy(
        &cluster,
        lockfile.into(),
        AssertUnwindSafe(|| {
            cluster
                .createdb("test_db")
                .expect("creating test_db database");
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed initializing tokio runtime");
            let pool = runtime.block_on(async move {
                let pool = create_sqlx_pool(
                    &format!("postgresql://?host={}&dbname=test_db", datadir_path),
                    16,
                )
                .await
                .expect("creating sqlx pool");
                MIGRATOR
                    .run(&pool)
                    .await
                    .expect("failed applying migrations");
                PgPool::new(pool)
            });
            test(&runtime, pool)
        }),
    )
    .expect("coordinating spinup and shutdown of the pg cluster");
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            with_pg_pool(stringify!($name), |runtime, pool| {
                let runtime = AssertUnwindSafe(runtime);
                let pool = AssertUnwindSafe(pool);
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        // run the test
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            // cleanup
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        // resume the panics
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
        }
    };
}

macro_rules! do_pg_test {
    ( $name:ident, $fn:expr ) => {
        #[test]
        fn $name() {
            with_pg_pool(stringify!($name), |runtime, pool| {
                let () = runtime.block_on($fn(pool));
            })
        }
    };
}

#[test]
fn fuzz_call_parsing() {
    bolero::check!()
        .with_type::<(String, String)>()
        .cloned()
        .for_each(|(op, body)| {
            let input = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
            if let Err(e) = Call::parse(&op, input) {
                assert!(e.is_client_error(), "parsing failure is not a client error: {e}");
            }
        });
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!(
                r#"
                    Failed parsing resp body!

                    The error is the following:
                    ---
                    {err}
                    ---

                    Response body is:
                    ---
                    {body:?}
                    ---

                    Request was:
                    ---
                    {req_body:?}
                    ---
                "#
            )
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(app: &mut Router, uri: &str, body: &Req) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method("POST")
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

/// What must be equal between app and mock, ie. everything but generated ids and dates
trait Normalize {
    type Out: Debug + PartialEq;

    fn normalize(&self) -> Self::Out;
}

impl Normalize for Post {
    type Out = (String, String, String);

    fn normalize(&self) -> Self::Out {
        (self.title.clone(), self.author.clone(), self.content.clone())
    }
}

impl Normalize for Comment {
    type Out = (String, String, i64, i64, bool);

    fn normalize(&self) -> Self::Out {
        (
            self.author.clone(),
            self.content.clone(),
            self.reply_count,
            self.votes,
            self.is_reply(),
        )
    }
}

impl<T: Normalize> Normalize for Option<T> {
    type Out = Option<T::Out>;

    fn normalize(&self) -> Self::Out {
        self.as_ref().map(T::normalize)
    }
}

impl<T: Normalize> Normalize for Page<T> {
    type Out = (Vec<T::Out>, bool);

    fn normalize(&self) -> Self::Out {
        (
            self.items.iter().map(T::normalize).collect(),
            self.cursor.is_some(),
        )
    }
}

fn normalize_err(e: &ApiError) -> ApiError {
    match e {
        ApiError::PostNotFound(_) => ApiError::PostNotFound(PostId::stub()),
        ApiError::CommentNotFound(_) => ApiError::CommentNotFound(CommentId::stub()),
        e => e.clone(),
    }
}

fn compare<T: Normalize>(name: &str, app_res: &Result<T, ApiError>, mock_res: &Result<T, ApiError>) {
    assert_eq!(
        app_res.as_ref().map(T::normalize).map_err(normalize_err),
        mock_res.as_ref().map(T::normalize).map_err(normalize_err),
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreatePost {
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        title: String,
        #[generator(bolero::generator::gen_with::<String>().len(0..10usize))]
        author: String,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    GetPosts {
        page_size: Option<u8>,
    },
    GetPost {
        post: usize,
    },
    CommentPost {
        post: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..10usize))]
        author: String,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    GetPostComments {
        post: usize,
        page_size: Option<u8>,
    },
    ReplyComment {
        comment: usize,
        /// `None` to reply within the comment's own post
        post: Option<usize>,
        #[generator(bolero::generator::gen_with::<String>().len(0..10usize))]
        author: String,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    GetCommentReplies {
        comment: usize,
        page_size: Option<u8>,
    },
    UpVote {
        comment: usize,
    },
    DownVote {
        comment: usize,
    },
}

struct KnownComment {
    app: CommentId,
    mock: CommentId,
    post: usize,
}

struct ComparativeFuzzer {
    app: Router,
    mock: MockServer,
    posts: Vec<(PostId, PostId)>,
    comments: Vec<KnownComment>,
}

impl ComparativeFuzzer {
    fn new(pool: PgPool) -> ComparativeFuzzer {
        ComparativeFuzzer {
            app: app(pool, PageSize(DEFAULT_PAGE_SIZE)),
            mock: MockServer::new(),
            posts: Vec::new(),
            comments: Vec::new(),
        }
    }

    fn post(&self, post: usize) -> (PostId, PostId) {
        resize_int(post, ..self.posts.len())
            .map(|p| self.posts[p])
            .unwrap_or((PostId::stub(), PostId::stub()))
    }

    /// Returns (app id, mock id, post index) of a known comment, if any
    fn comment(&self, comment: usize) -> Option<(CommentId, CommentId, usize)> {
        resize_int(comment, ..self.comments.len()).map(|c| {
            let c = &self.comments[c];
            (c.app, c.mock, c.post)
        })
    }

    /// Follows cursors on both sides until the last page, comparing each page
    async fn walk<T, FA, FM>(&mut self, name: &str, uri: &str, app_input: FA, mock_fetch: FM)
    where
        T: 'static + Normalize + for<'de> serde::Deserialize<'de>,
        FA: Fn(Option<Cursor>) -> serde_json::Value,
        FM: Fn(&MockServer, Option<Cursor>) -> Result<Page<T>, ApiError>,
    {
        let (mut app_cursor, mut mock_cursor) = (None, None);
        loop {
            let app_page: Result<Page<T>, ApiError> =
                run_on_app(&mut self.app, uri, &app_input(app_cursor.take())).await;
            let mock_page = mock_fetch(&self.mock, mock_cursor.take());
            compare(name, &app_page, &mock_page);
            match (app_page, mock_page) {
                (Ok(a), Ok(m)) if a.cursor.is_some() => {
                    app_cursor = a.cursor;
                    mock_cursor = m.cursor;
                }
                _ => break,
            }
        }
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreatePost {
                title,
                author,
                content,
            } => {
                let new_post = NewPost {
                    title,
                    author,
                    content,
                };
                let app = run_on_app(&mut self.app, "/api/createPost", &new_post).await;
                let mock = self.mock.create_post(new_post);
                compare::<Post>("CreatePost", &app, &mock);
                if let (Ok(app), Ok(mock)) = (app, mock) {
                    self.posts.push((app.id, mock.id));
                }
            }
            FuzzOp::GetPosts { page_size } => {
                let page_size = page_size.map(u32::from);
                self.walk(
                    "GetPosts",
                    "/api/getPosts",
                    |cursor| serde_json::json!(PostsPage { cursor, page_size }),
                    |mock, cursor| mock.get_posts(PostsPage { cursor, page_size }),
                )
                .await
            }
            FuzzOp::GetPost { post } => {
                let (app_id, mock_id) = self.post(post);
                let app = run_on_app(&mut self.app, "/api/getPost", &PostRef { id: app_id }).await;
                let mock = self.mock.get_post(PostRef { id: mock_id });
                compare::<Option<Post>>("GetPost", &app, &mock);
            }
            FuzzOp::CommentPost {
                post,
                author,
                content,
            } => {
                let post_idx = resize_int(post, ..self.posts.len());
                let (app_post, mock_post) = self.post(post);
                let app = run_on_app(
                    &mut self.app,
                    "/api/commentPost",
                    &NewComment {
                        post_id: app_post,
                        author: author.clone(),
                        content: content.clone(),
                    },
                )
                .await;
                let mock = self.mock.comment_post(NewComment {
                    post_id: mock_post,
                    author,
                    content,
                });
                compare::<Comment>("CommentPost", &app, &mock);
                if let (Ok(app), Ok(mock), Some(post)) = (app, mock, post_idx) {
                    self.comments.push(KnownComment {
                        app: app.id,
                        mock: mock.id,
                        post,
                    });
                }
            }
            FuzzOp::GetPostComments { post, page_size } => {
                let (app_post, mock_post) = self.post(post);
                let page_size = page_size.map(u32::from);
                self.walk(
                    "GetPostComments",
                    "/api/getPostComments",
                    |cursor| {
                        serde_json::json!(PostCommentsPage {
                            post_id: app_post,
                            cursor,
                            page_size
                        })
                    },
                    |mock, cursor| {
                        mock.get_post_comments(PostCommentsPage {
                            post_id: mock_post,
                            cursor,
                            page_size,
                        })
                    },
                )
                .await
            }
            FuzzOp::ReplyComment {
                comment,
                post,
                author,
                content,
            } => {
                let Some((app_parent, mock_parent, parent_post)) = self.comment(comment) else {
                    // no comment yet, create one to reply to
                    self.execute_fuzz_op(FuzzOp::CommentPost {
                        post: comment,
                        author: String::from("author"),
                        content: String::from("content"),
                    })
                    .await;
                    if !self.comments.is_empty() {
                        self.execute_fuzz_op(FuzzOp::ReplyComment {
                            comment,
                            post,
                            author,
                            content,
                        })
                        .await;
                    }
                    return;
                };
                let post_idx = match post {
                    None => Some(parent_post),
                    Some(p) => resize_int(p, ..self.posts.len()),
                };
                let (app_post, mock_post) = match post_idx {
                    Some(p) => self.posts[p],
                    None => (PostId::stub(), PostId::stub()),
                };
                let app = run_on_app(
                    &mut self.app,
                    "/api/replyComment",
                    &NewReply {
                        post_id: app_post,
                        in_reply_to_id: app_parent,
                        author: author.clone(),
                        content: content.clone(),
                    },
                )
                .await;
                let mock = self.mock.reply_comment(NewReply {
                    post_id: mock_post,
                    in_reply_to_id: mock_parent,
                    author,
                    content,
                });
                compare::<Comment>("ReplyComment", &app, &mock);
                if let (Ok(app), Ok(mock), Some(post)) = (app, mock, post_idx) {
                    self.comments.push(KnownComment {
                        app: app.id,
                        mock: mock.id,
                        post,
                    });
                }
            }
            FuzzOp::GetCommentReplies { comment, page_size } => {
                let (app_parent, mock_parent, post) = self.comment(comment).unwrap_or((
                    CommentId::stub(),
                    CommentId::stub(),
                    0,
                ));
                let (app_post, mock_post) = self.post(post);
                let page_size = page_size.map(u32::from);
                self.walk(
                    "GetCommentReplies",
                    "/api/getCommentReplies",
                    |cursor| {
                        serde_json::json!(CommentRepliesPage {
                            post_id: app_post,
                            in_reply_to_id: app_parent,
                            cursor,
                            page_size
                        })
                    },
                    |mock, cursor| {
                        mock.get_comment_replies(CommentRepliesPage {
                            post_id: mock_post,
                            in_reply_to_id: mock_parent,
                            cursor,
                            page_size,
                        })
                    },
                )
                .await
            }
            FuzzOp::UpVote { comment } => self.vote(comment, true).await,
            FuzzOp::DownVote { comment } => self.vote(comment, false).await,
        }
    }

    async fn vote(&mut self, comment: usize, up: bool) {
        let (app_id, mock_id, _) = self
            .comment(comment)
            .unwrap_or((CommentId::stub(), CommentId::stub(), 0));
        let (uri, mock) = match up {
            true => ("/api/upVotePost", self.mock.up_vote(CommentRef { id: mock_id })),
            false => (
                "/api/downVotePost",
                self.mock.down_vote(CommentRef { id: mock_id }),
            ),
        };
        let app = run_on_app(&mut self.app, uri, &CommentRef { id: app_id }).await;
        compare::<Comment>(uri, &app, &mock);
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..40usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);

fn new_post(title: &str) -> NewPost {
    NewPost {
        title: String::from(title),
        author: String::from(title),
        content: String::from(title),
    }
}

fn new_reply(post: &Post, parent: &Comment) -> NewReply {
    NewReply {
        post_id: post.id,
        in_reply_to_id: parent.id,
        author: String::from("replier"),
        content: String::from("reply"),
    }
}

async fn post_with_comment(pool: &PgPool) -> (Post, Comment) {
    let mut conn = pool.acquire().await.expect("acquiring connection");
    let post = db::create_post(&mut conn, new_post("post"))
        .await
        .expect("creating post");
    let comment = db::comment_post(
        &mut conn,
        NewComment {
            post_id: post.id,
            author: String::from("commenter"),
            content: String::from("comment"),
        },
    )
    .await
    .expect("creating comment");
    (post, comment)
}

do_pg_test!(created_post_can_be_retrieved, |pool: PgPool| async move {
    let mut app = app(pool, PageSize(DEFAULT_PAGE_SIZE));
    let created: Post = run_on_app(&mut app, "/api/createPost", &new_post("Test"))
        .await
        .expect("creating post");
    let fetched: Option<Post> = run_on_app(&mut app, "/api/getPost", &PostRef { id: created.id })
        .await
        .expect("fetching post");
    assert_eq!(fetched, Some(created));
    let missing: Option<Post> =
        run_on_app(&mut app, "/api/getPost", &PostRef { id: PostId::stub() })
            .await
            .expect("fetching missing post");
    assert_eq!(missing, None);
});

do_pg_test!(posts_paginate_newest_first, |pool: PgPool| async move {
    let mut conn = pool.acquire().await.expect("acquiring connection");
    db::create_post(&mut conn, new_post("First")).await.unwrap();
    let second = db::create_post(&mut conn, new_post("Second")).await.unwrap();

    let page = db::fetch_posts(&mut conn, None, 1).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "Second");
    let cursor = page.cursor.expect("first page has a cursor");
    assert_eq!(cursor.created_at(), second.created_at);

    let page = db::fetch_posts(&mut conn, Some(&cursor), 1).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "First");
    assert_eq!(page.cursor, None);
});

do_pg_test!(equal_timestamps_are_not_skipped, |pool: PgPool| async move {
    let mut conn = pool.acquire().await.expect("acquiring connection");
    for i in 0..5 {
        sqlx::query(
            "INSERT INTO posts (id, title, author, content, created_at)
             VALUES ($1, $2, 'a', 'c', '2024-01-01T00:00:00Z')",
        )
        .bind(agora_api::Uuid::new_v4())
        .bind(format!("post {i}"))
        .execute(&mut *conn)
        .await
        .expect("inserting tied post");
    }
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = db::fetch_posts(&mut conn, cursor.as_ref(), 2).await.unwrap();
        seen.extend(page.items.into_iter().map(|p| p.id));
        match page.cursor {
            None => break,
            c => cursor = c,
        }
    }
    let mut dedup = seen.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(seen.len(), 5);
    assert_eq!(dedup.len(), 5);
});

do_pg_test!(concurrent_replies_are_all_counted, |pool: PgPool| async move {
    const NUM_REPLIES: usize = 25;
    let (post, parent) = post_with_comment(&pool).await;
    let results = futures::future::join_all((0..NUM_REPLIES).map(|_| {
        let pool = pool.clone();
        let reply = new_reply(&post, &parent);
        async move {
            let mut conn = pool.acquire().await?;
            db::reply_comment(&mut conn, reply).await
        }
    }))
    .await;
    for r in results {
        r.expect("replying");
    }

    let mut conn = pool.acquire().await.expect("acquiring connection");
    let top = db::fetch_post_comments(&mut conn, post.id, None, 10)
        .await
        .unwrap();
    assert_eq!(top.items.len(), 1, "replies must not be listed as top-level");
    assert_eq!(top.items[0].reply_count, NUM_REPLIES as i64);

    let replies = db::fetch_comment_replies(&mut conn, post.id, parent.id, None, 100)
        .await
        .unwrap();
    assert_eq!(replies.items.len(), NUM_REPLIES);
    assert!(replies
        .items
        .iter()
        .all(|r| r.in_reply_to_id == Some(parent.id) && r.post_id == post.id));
    assert_eq!(replies.cursor, None);
});

do_pg_test!(reply_into_other_post_rolls_back, |pool: PgPool| async move {
    let (post, parent) = post_with_comment(&pool).await;
    let mut conn = pool.acquire().await.expect("acquiring connection");
    let other = db::create_post(&mut conn, new_post("other")).await.unwrap();
    let mut reply = new_reply(&post, &parent);
    reply.post_id = other.id;
    match db::reply_comment(&mut conn, reply).await {
        Err(Error::Api(ApiError::CommentNotFound(id))) => assert_eq!(id, parent.id),
        r => panic!("unexpected reply result {r:?}"),
    }
    let top = db::fetch_post_comments(&mut conn, post.id, None, 10)
        .await
        .unwrap();
    assert_eq!(top.items[0].reply_count, 0);
    let stray = db::fetch_comment_replies(&mut conn, other.id, parent.id, None, 10)
        .await
        .unwrap();
    assert!(stray.items.is_empty());
});

do_pg_test!(concurrent_votes_are_not_lost, |pool: PgPool| async move {
    let (_, comment) = post_with_comment(&pool).await;
    let votes = futures::future::join_all((0..10).map(|i| {
        let pool = pool.clone();
        async move {
            let mut conn = pool.acquire().await?;
            db::vote_comment(&mut conn, comment.id, if i < 7 { 1 } else { -1 }).await
        }
    }))
    .await;
    for v in votes {
        v.expect("voting");
    }
    let mut conn = pool.acquire().await.expect("acquiring connection");
    let c = db::vote_comment(&mut conn, comment.id, 1).await.unwrap();
    assert_eq!(c.votes, 7 - 3 + 1);
});

do_pg_test!(batch_isolates_failures, |pool: PgPool| async move {
    let mut app = app(pool, PageSize(DEFAULT_PAGE_SIZE));
    let calls = vec![
        serde_json::to_value(Call::CreatePost(new_post("batched"))).unwrap(),
        serde_json::json!({"op": "getReplies", "input": {}}),
        serde_json::json!({"op": "commentPost", "input": {
            "postId": PostId::stub(), "author": "a", "content": "c",
        }}),
        serde_json::to_value(Call::GetPosts(PostsPage::default())).unwrap(),
    ];
    let results: Vec<CallResult> = run_on_app(&mut app, "/api/batch", &calls)
        .await
        .expect("running batch");
    assert_eq!(results.len(), 4);
    let results = results
        .into_iter()
        .map(CallResult::into_result)
        .collect::<Vec<_>>();
    assert!(results[0].is_ok());
    assert_eq!(
        results[1],
        Err(ApiError::UnknownOperation(String::from("getReplies")))
    );
    assert_eq!(results[2], Err(ApiError::PostNotFound(PostId::stub())));
    let page: Page<Post> = serde_json::from_value(results[3].clone().unwrap()).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "batched");
});

do_pg_test!(invalid_input_never_reaches_the_store, |pool: PgPool| async move {
    let mut app = app(pool.clone(), PageSize(DEFAULT_PAGE_SIZE));
    let res: Result<Post, ApiError> = run_on_app(
        &mut app,
        "/api/createPost",
        &serde_json::json!({"title": "t", "author": "nul\u{0}", "content": "c"}),
    )
    .await;
    assert!(matches!(res, Err(ApiError::NullByteInString(_))));
    let res: Result<Post, ApiError> =
        run_on_app(&mut app, "/api/createPost", &serde_json::json!({"title": 3})).await;
    assert!(matches!(res, Err(ApiError::InvalidInput(_))));
    let mut conn = pool.acquire().await.expect("acquiring connection");
    let page = db::fetch_posts(&mut conn, None, 10).await.unwrap();
    assert!(page.items.is_empty());
});
