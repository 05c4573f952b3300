use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;

use crate::{
    api::{
        Call, Comment, CommentId, CommentRef, CommentRepliesPage, Cursor, NewComment, NewPost,
        NewReply, Page, Post, PostCommentsPage, PostId, PostRef, PostsPage,
    },
    ClientError, RpcClient,
};

/// Identity of one cached query
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum QueryKey {
    Posts,
    Post(PostId),
    PostComments {
        post_id: PostId,
    },
    CommentReplies {
        post_id: PostId,
        in_reply_to_id: CommentId,
    },
}

/// A set of keys that get invalidated together
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyFamily {
    Posts,
    Post(PostId),
    PostComments(PostId),
    /// All the reply lists of the post, whatever the comment they answer
    CommentReplies(PostId),
}

impl KeyFamily {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match (self, key) {
            (KeyFamily::Posts, QueryKey::Posts) => true,
            (KeyFamily::Post(f), QueryKey::Post(k)) => f == k,
            (KeyFamily::PostComments(f), QueryKey::PostComments { post_id }) => f == post_id,
            (KeyFamily::CommentReplies(f), QueryKey::CommentReplies { post_id, .. }) => {
                f == post_id
            }
            _ => false,
        }
    }
}

/// The pages loaded so far for a paginated query, oldest-loaded first
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Infinite<T> {
    pub pages: Vec<Page<T>>,
}

impl<T> Infinite<T> {
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn has_next_page(&self) -> bool {
        self.last_cursor().is_some()
    }

    fn last_cursor(&self) -> Option<&Cursor> {
        self.pages.last().and_then(|p| p.cursor.as_ref())
    }
}

#[derive(Clone, Debug)]
enum Data {
    Post(Option<Post>),
    Posts(Infinite<Post>),
    Comments(Infinite<Comment>),
}

impl Data {
    fn num_pages(&self) -> usize {
        match self {
            Data::Post(_) => 1,
            Data::Posts(i) => i.pages.len(),
            Data::Comments(i) => i.pages.len(),
        }
    }

    fn last_cursor(&self) -> Option<&Cursor> {
        match self {
            Data::Post(_) => None,
            Data::Posts(i) => i.last_cursor(),
            Data::Comments(i) => i.last_cursor(),
        }
    }

    fn push_page(&mut self, page: serde_json::Value) -> Result<(), ClientError> {
        fn parse<T: for<'de> serde::Deserialize<'de>>(
            page: serde_json::Value,
        ) -> Result<Page<T>, ClientError> {
            serde_json::from_value(page)
                .map_err(|e| ClientError::Transport(format!("parsing page: {e}")))
        }
        match self {
            Data::Post(_) => (),
            Data::Posts(i) => i.pages.push(parse(page)?),
            Data::Comments(i) => i.pages.push(parse(page)?),
        }
        Ok(())
    }
}

struct Entry {
    data: Data,
    stale: bool,
}

type Fetch = Shared<BoxFuture<'static, Result<Data, ClientError>>>;

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    /// Bumped on each invalidation of the key
    generations: HashMap<QueryKey, u64>,
    /// Keyed by the cursor the request starts from
    in_flight: HashMap<(QueryKey, Option<Cursor>), Fetch>,
}

impl State {
    fn generation(&self, key: &QueryKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    fn finish(&mut self, flight: &(QueryKey, Option<Cursor>), generation: u64) {
        // an invalidation already dropped it, and maybe replaced it with a newer one
        if self.generation(&flight.0) == generation {
            self.in_flight.remove(flight);
        }
    }
}

fn unexpected(key: &QueryKey, data: Data) -> ClientError {
    ClientError::Transport(format!(
        "cache entry for {key:?} holds unexpected data {data:?}"
    ))
}

/// Caches query results by key, with infinite pagination and invalidation on mutation
#[derive(Clone)]
pub struct QueryCache {
    rpc: RpcClient,
    page_size: Option<u32>,
    state: Arc<Mutex<State>>,
}

impl QueryCache {
    pub fn new(rpc: RpcClient) -> QueryCache {
        QueryCache {
            rpc,
            page_size: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Page size to request, the server's default if unset
    pub fn with_page_size(mut self, page_size: u32) -> QueryCache {
        self.page_size = Some(page_size);
        self
    }

    /// Whether the key is cached, and if so whether the next read will refetch it
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.state.lock().entries.get(key).map(|e| e.stale)
    }

    pub fn invalidate(&self, family: KeyFamily) {
        let mut state = self.state.lock();
        let State {
            entries,
            generations,
            in_flight,
        } = &mut *state;
        let mut keys = HashSet::new();
        for (key, entry) in entries.iter_mut().filter(|(k, _)| family.matches(k)) {
            entry.stale = true;
            keys.insert(key.clone());
        }
        in_flight.retain(|(key, _), _| {
            let matches = family.matches(key);
            if matches {
                keys.insert(key.clone());
            }
            !matches
        });
        tracing::trace!(?family, num_keys = keys.len(), "invalidating");
        for key in keys {
            *generations.entry(key).or_insert(0) += 1;
        }
    }

    fn page_call(&self, key: &QueryKey, cursor: Option<Cursor>) -> Call {
        let page_size = self.page_size;
        match *key {
            QueryKey::Posts => Call::GetPosts(PostsPage { cursor, page_size }),
            QueryKey::Post(id) => Call::GetPost(PostRef { id }),
            QueryKey::PostComments { post_id } => Call::GetPostComments(PostCommentsPage {
                post_id,
                cursor,
                page_size,
            }),
            QueryKey::CommentReplies {
                post_id,
                in_reply_to_id,
            } => Call::GetCommentReplies(CommentRepliesPage {
                post_id,
                in_reply_to_id,
                cursor,
                page_size,
            }),
        }
    }

    async fn fetch_pages<T>(&self, key: &QueryKey, pages: usize) -> Result<Infinite<T>, ClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let mut res = Infinite { pages: Vec::new() };
        let mut cursor = None;
        while res.pages.len() < pages {
            let page: Page<T> = self.rpc.typed(self.page_call(key, cursor.take())).await?;
            cursor = page.cursor.clone();
            res.pages.push(page);
            if cursor.is_none() {
                break;
            }
        }
        Ok(res)
    }

    async fn refetch(self, key: QueryKey, pages: usize, generation: u64) -> Result<Data, ClientError> {
        let res = match key {
            QueryKey::Post(id) => self.rpc.get_post(PostRef { id }).await.map(Data::Post),
            QueryKey::Posts => self.fetch_pages(&key, pages).await.map(Data::Posts),
            QueryKey::PostComments { .. } | QueryKey::CommentReplies { .. } => {
                self.fetch_pages(&key, pages).await.map(Data::Comments)
            }
        };
        let mut state = self.state.lock();
        state.finish(&(key.clone(), None), generation);
        let data = res?;
        let stale = state.generation(&key) != generation;
        let fresher_exists = state.entries.get(&key).map_or(false, |e| !e.stale);
        if !(stale && fresher_exists) {
            state.entries.insert(
                key,
                Entry {
                    data: data.clone(),
                    stale,
                },
            );
        }
        Ok(data)
    }

    async fn fetch_next(self, key: QueryKey, cursor: Cursor, generation: u64) -> Result<Data, ClientError> {
        let res = self.rpc.call(self.page_call(&key, Some(cursor.clone()))).await;
        let mut state = self.state.lock();
        state.finish(&(key.clone(), Some(cursor.clone())), generation);
        let page = res?;
        let entry = match state.entries.get_mut(&key) {
            Some(entry) => entry,
            None => return Err(ClientError::Transport(format!("{key:?} left the cache"))),
        };
        if entry.data.last_cursor() == Some(&cursor) {
            entry.data.push_page(page)?;
        } else {
            tracing::debug!(?key, "entry moved while fetching next page, discarding page");
        }
        Ok(entry.data.clone())
    }

    /// Returns the cached data for `key`, (re)fetching it if missing or stale
    async fn read(&self, key: QueryKey) -> Result<Data, ClientError> {
        let fetch = {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.get(&key) {
                if !entry.stale {
                    return Ok(entry.data.clone());
                }
            }
            let flight = (key.clone(), None);
            match state.in_flight.get(&flight) {
                Some(fetch) => fetch.clone(),
                None => {
                    let pages = state
                        .entries
                        .get(&key)
                        .map_or(1, |e| e.data.num_pages())
                        .max(1);
                    let generation = state.generation(&key);
                    let fetch = self.clone().refetch(key, pages, generation).boxed().shared();
                    state.in_flight.insert(flight, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Appends the page following the last loaded one, if any
    async fn next_page(&self, key: QueryKey) -> Result<Data, ClientError> {
        let fetch = {
            let mut state = self.state.lock();
            let cursor = match state.entries.get(&key) {
                None => None,
                Some(entry) => match entry.data.last_cursor() {
                    None => return Ok(entry.data.clone()),
                    Some(cursor) => Some(cursor.clone()),
                },
            };
            cursor.map(|cursor| {
                let flight = (key.clone(), Some(cursor.clone()));
                match state.in_flight.get(&flight) {
                    Some(fetch) => fetch.clone(),
                    None => {
                        let generation = state.generation(&key);
                        let fetch = self
                            .clone()
                            .fetch_next(key.clone(), cursor, generation)
                            .boxed()
                            .shared();
                        state.in_flight.insert(flight, fetch.clone());
                        fetch
                    }
                }
            })
        };
        match fetch {
            Some(fetch) => fetch.await,
            None => self.read(key).await,
        }
    }

    async fn read_posts(&self, key: QueryKey, next: bool) -> Result<Infinite<Post>, ClientError> {
        let data = match next {
            false => self.read(key.clone()).await?,
            true => self.next_page(key.clone()).await?,
        };
        match data {
            Data::Posts(posts) => Ok(posts),
            data => Err(unexpected(&key, data)),
        }
    }

    async fn read_comments(
        &self,
        key: QueryKey,
        next: bool,
    ) -> Result<Infinite<Comment>, ClientError> {
        let data = match next {
            false => self.read(key.clone()).await?,
            true => self.next_page(key.clone()).await?,
        };
        match data {
            Data::Comments(comments) => Ok(comments),
            data => Err(unexpected(&key, data)),
        }
    }

    pub async fn posts(&self) -> Result<Infinite<Post>, ClientError> {
        self.read_posts(QueryKey::Posts, false).await
    }

    pub async fn fetch_next_posts(&self) -> Result<Infinite<Post>, ClientError> {
        self.read_posts(QueryKey::Posts, true).await
    }

    pub async fn post(&self, id: PostId) -> Result<Option<Post>, ClientError> {
        let key = QueryKey::Post(id);
        match self.read(key.clone()).await? {
            Data::Post(post) => Ok(post),
            data => Err(unexpected(&key, data)),
        }
    }

    pub async fn post_comments(&self, post_id: PostId) -> Result<Infinite<Comment>, ClientError> {
        self.read_comments(QueryKey::PostComments { post_id }, false)
            .await
    }

    pub async fn fetch_next_post_comments(
        &self,
        post_id: PostId,
    ) -> Result<Infinite<Comment>, ClientError> {
        self.read_comments(QueryKey::PostComments { post_id }, true)
            .await
    }

    pub async fn comment_replies(
        &self,
        post_id: PostId,
        in_reply_to_id: CommentId,
    ) -> Result<Infinite<Comment>, ClientError> {
        let key = QueryKey::CommentReplies {
            post_id,
            in_reply_to_id,
        };
        self.read_comments(key, false).await
    }

    pub async fn fetch_next_comment_replies(
        &self,
        post_id: PostId,
        in_reply_to_id: CommentId,
    ) -> Result<Infinite<Comment>, ClientError> {
        let key = QueryKey::CommentReplies {
            post_id,
            in_reply_to_id,
        };
        self.read_comments(key, true).await
    }

    pub async fn create_post(&self, p: NewPost) -> Result<Post, ClientError> {
        let post = self.rpc.create_post(p).await?;
        self.invalidate(KeyFamily::Posts);
        Ok(post)
    }

    pub async fn comment_post(&self, c: NewComment) -> Result<Comment, ClientError> {
        let comment = self.rpc.comment_post(c).await?;
        self.invalidate(KeyFamily::PostComments(comment.post_id));
        Ok(comment)
    }

    /// Invalidates both the top-level comments and all the reply lists of the post
    pub async fn reply_comment(&self, r: NewReply) -> Result<Comment, ClientError> {
        let reply = self.rpc.reply_comment(r).await?;
        self.invalidate_comments_of(reply.post_id);
        Ok(reply)
    }

    pub async fn up_vote(&self, id: CommentId) -> Result<Comment, ClientError> {
        let comment = self.rpc.up_vote(CommentRef { id }).await?;
        self.invalidate_comments_of(comment.post_id);
        Ok(comment)
    }

    pub async fn down_vote(&self, id: CommentId) -> Result<Comment, ClientError> {
        let comment = self.rpc.down_vote(CommentRef { id }).await?;
        self.invalidate_comments_of(comment.post_id);
        Ok(comment)
    }

    fn invalidate_comments_of(&self, post: PostId) {
        self.invalidate(KeyFamily::PostComments(post));
        self.invalidate(KeyFamily::CommentReplies(post));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use agora_mock_server::MockServer;
    use async_trait::async_trait;
    use futures::channel::oneshot;
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        api::{CallResult, Error},
        Transport,
    };

    struct MockTransport {
        server: Mutex<MockServer>,
        batches: Mutex<Vec<Vec<&'static str>>>,
        /// While set, responses are held back until `release`
        hold: AtomicBool,
        held: Mutex<Vec<oneshot::Sender<()>>>,
    }

    impl MockTransport {
        fn new(page_size: u32) -> Arc<MockTransport> {
            Arc::new(MockTransport {
                server: Mutex::new(MockServer::with_page_size(page_size)),
                batches: Mutex::new(Vec::new()),
                hold: AtomicBool::new(false),
                held: Mutex::new(Vec::new()),
            })
        }

        fn num_calls(&self) -> usize {
            self.batches.lock().iter().map(Vec::len).sum()
        }

        fn hold(&self, hold: bool) {
            self.hold.store(hold, Ordering::SeqCst);
        }

        async fn wait_held(&self, num_batches: usize) {
            while self.held.lock().len() < num_batches {
                tokio::task::yield_now().await;
            }
        }

        fn release(&self) {
            for tx in self.held.lock().drain(..) {
                let _ = tx.send(());
            }
        }
    }

    #[async_trait]
    impl Transport for Arc<MockTransport> {
        async fn batch(&self, calls: Vec<Call>) -> Result<Vec<CallResult>, ClientError> {
            self.batches
                .lock()
                .push(calls.iter().map(Call::name).collect());
            let calls = calls
                .into_iter()
                .map(|c| serde_json::to_value(c).unwrap())
                .collect();
            // served now, delivered on release
            let res = self.server.lock().batch(calls);
            if self.hold.load(Ordering::SeqCst) {
                let (tx, rx) = oneshot::channel();
                self.held.lock().push(tx);
                let _ = rx.await;
            }
            Ok(res)
        }
    }

    struct DownTransport;

    #[async_trait]
    impl Transport for DownTransport {
        async fn batch(&self, _: Vec<Call>) -> Result<Vec<CallResult>, ClientError> {
            Err(ClientError::Transport(String::from("connection refused")))
        }
    }

    fn cache(page_size: u32) -> (Arc<MockTransport>, QueryCache) {
        let transport = MockTransport::new(page_size);
        let cache = QueryCache::new(RpcClient::new(transport.clone()));
        (transport, cache)
    }

    fn new_post(title: &str) -> NewPost {
        NewPost {
            title: String::from(title),
            author: String::from("author"),
            content: String::from("content"),
        }
    }

    fn new_comment(post_id: PostId) -> NewComment {
        NewComment {
            post_id,
            author: String::from("commenter"),
            content: String::from("comment"),
        }
    }

    fn new_reply(post_id: PostId, in_reply_to_id: CommentId) -> NewReply {
        NewReply {
            post_id,
            in_reply_to_id,
            author: String::from("replier"),
            content: String::from("reply"),
        }
    }

    fn titles(posts: &Infinite<Post>) -> Vec<&str> {
        posts.items().map(|p| &p.title as &str).collect()
    }

    #[tokio::test]
    async fn identical_concurrent_fetches_share_a_request() {
        let (transport, cache) = cache(10);
        cache.create_post(new_post("only")).await.unwrap();
        let before = transport.num_calls();
        let (a, b) = tokio::join!(cache.posts(), cache.posts());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(transport.num_calls(), before + 1);
        // now served from the cache
        assert_eq!(titles(&cache.posts().await.unwrap()), vec!["only"]);
        assert_eq!(transport.num_calls(), before + 1);
    }

    #[tokio::test]
    async fn calls_of_a_tick_are_batched() {
        let (transport, cache) = cache(10);
        let post = cache.create_post(new_post("p")).await.unwrap();
        let (posts, fetched, comments) = tokio::join!(
            cache.posts(),
            cache.post(post.id),
            cache.post_comments(post.id)
        );
        assert_eq!(titles(&posts.unwrap()), vec!["p"]);
        assert_eq!(fetched.unwrap(), Some(post));
        assert_eq!(comments.unwrap().items().count(), 0);
        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(
            batches[1],
            vec!["getPosts", "getPost", "getPostComments"]
        );
    }

    #[tokio::test]
    async fn next_page_appends() {
        let (transport, cache) = cache(2);
        for i in 0..5 {
            cache.create_post(new_post(&i.to_string())).await.unwrap();
        }
        let posts = cache.posts().await.unwrap();
        assert_eq!(titles(&posts), vec!["4", "3"]);
        assert!(posts.has_next_page());
        let posts = cache.fetch_next_posts().await.unwrap();
        assert_eq!(titles(&posts), vec!["4", "3", "2", "1"]);
        let posts = cache.fetch_next_posts().await.unwrap();
        assert_eq!(titles(&posts), vec!["4", "3", "2", "1", "0"]);
        assert_eq!(posts.pages.len(), 3);
        assert!(!posts.has_next_page());

        let calls = transport.num_calls();
        let posts = cache.fetch_next_posts().await.unwrap();
        assert_eq!(posts.pages.len(), 3);
        assert_eq!(transport.num_calls(), calls, "fetched past the last page");
    }

    #[tokio::test]
    async fn result_landing_after_invalidation_is_stale() {
        let (transport, cache) = cache(10);
        cache.create_post(new_post("p")).await.unwrap();
        transport.hold(true);
        let (posts, ()) = tokio::join!(cache.posts(), async {
            transport.wait_held(1).await;
            cache.invalidate(KeyFamily::Posts);
            transport.hold(false);
            transport.release();
        });
        assert_eq!(titles(&posts.unwrap()), vec!["p"]);
        assert_eq!(cache.is_stale(&QueryKey::Posts), Some(true));

        let calls = transport.num_calls();
        cache.posts().await.unwrap();
        assert_eq!(transport.num_calls(), calls + 1);
        assert_eq!(cache.is_stale(&QueryKey::Posts), Some(false));
    }

    #[tokio::test]
    async fn late_result_does_not_replace_fresher_one() {
        let (transport, cache) = cache(10);
        cache.create_post(new_post("old")).await.unwrap();
        transport.hold(true);
        let (late, fresh) = tokio::join!(cache.posts(), async {
            transport.wait_held(1).await;
            transport.hold(false);
            cache.create_post(new_post("new")).await.unwrap();
            let posts = cache.posts().await.unwrap();
            transport.release();
            posts
        });
        assert_eq!(titles(&late.unwrap()), vec!["old"]);
        assert_eq!(titles(&fresh), vec!["new", "old"]);
        assert_eq!(cache.is_stale(&QueryKey::Posts), Some(false));
        let calls = transport.num_calls();
        assert_eq!(titles(&cache.posts().await.unwrap()), vec!["new", "old"]);
        assert_eq!(transport.num_calls(), calls);
    }

    #[tokio::test]
    async fn next_page_is_discarded_if_entry_moved() {
        let (transport, cache) = cache(1);
        cache.create_post(new_post("a")).await.unwrap();
        cache.create_post(new_post("b")).await.unwrap();
        assert_eq!(titles(&cache.posts().await.unwrap()), vec!["b"]);
        transport.hold(true);
        let (next, refetched) = tokio::join!(cache.fetch_next_posts(), async {
            transport.wait_held(1).await;
            transport.hold(false);
            cache.create_post(new_post("c")).await.unwrap();
            let posts = cache.posts().await.unwrap();
            transport.release();
            posts
        });
        assert_eq!(titles(&refetched), vec!["c"]);
        // "a" followed the old first page, appending it would skip "b"
        let next = next.unwrap();
        assert_eq!(titles(&next), vec!["c"]);
        assert_eq!(next.pages.len(), 1);
        assert_eq!(titles(&cache.posts().await.unwrap()), vec!["c"]);
    }

    #[tokio::test]
    async fn concurrent_next_page_fetches_share_a_request() {
        let (transport, cache) = cache(1);
        for i in 0..3 {
            cache.create_post(new_post(&i.to_string())).await.unwrap();
        }
        cache.posts().await.unwrap();
        let calls = transport.num_calls();
        let (a, b) = tokio::join!(cache.fetch_next_posts(), cache.fetch_next_posts());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(titles(&a), vec!["2", "1"]);
        assert_eq!(transport.num_calls(), calls + 1);
    }

    #[tokio::test]
    async fn next_page_of_unloaded_key_loads_first_page() {
        let (_, cache) = cache(1);
        cache.create_post(new_post("a")).await.unwrap();
        cache.create_post(new_post("b")).await.unwrap();
        let posts = cache.fetch_next_posts().await.unwrap();
        assert_eq!(titles(&posts), vec!["b"]);
    }

    #[tokio::test]
    async fn reply_invalidates_whole_post_families() {
        let (transport, cache) = cache(10);
        let a = cache.create_post(new_post("a")).await.unwrap();
        let b = cache.create_post(new_post("b")).await.unwrap();
        let a1 = cache.comment_post(new_comment(a.id)).await.unwrap();
        let a2 = cache.comment_post(new_comment(a.id)).await.unwrap();
        cache.comment_post(new_comment(b.id)).await.unwrap();

        cache.posts().await.unwrap();
        cache.post(a.id).await.unwrap();
        cache.post_comments(a.id).await.unwrap();
        cache.post_comments(b.id).await.unwrap();
        cache.comment_replies(a.id, a1.id).await.unwrap();
        cache.comment_replies(a.id, a2.id).await.unwrap();

        cache.reply_comment(new_reply(a.id, a1.id)).await.unwrap();

        let a_comments = QueryKey::PostComments { post_id: a.id };
        assert_eq!(cache.is_stale(&a_comments), Some(true));
        let replies = |c: &Comment| QueryKey::CommentReplies {
            post_id: a.id,
            in_reply_to_id: c.id,
        };
        assert_eq!(cache.is_stale(&replies(&a1)), Some(true));
        // coarse: the sibling's replies did not change, but are refetched anyway
        assert_eq!(cache.is_stale(&replies(&a2)), Some(true));
        let b_comments = QueryKey::PostComments { post_id: b.id };
        assert_eq!(cache.is_stale(&b_comments), Some(false));
        assert_eq!(cache.is_stale(&QueryKey::Posts), Some(false));
        assert_eq!(cache.is_stale(&QueryKey::Post(a.id)), Some(false));

        let calls = transport.num_calls();
        let comments = cache.post_comments(a.id).await.unwrap();
        assert_eq!(transport.num_calls(), calls + 1);
        let counts = comments
            .items()
            .map(|c| (c.id, c.reply_count))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![(a2.id, 0), (a1.id, 1)]);
        assert_eq!(cache.is_stale(&a_comments), Some(false));
        let replies = cache.comment_replies(a.id, a1.id).await.unwrap();
        assert_eq!(replies.items().count(), 1);
    }

    #[tokio::test]
    async fn mutations_invalidate_their_families() {
        let (_, cache) = cache(10);
        let post = cache.create_post(new_post("p")).await.unwrap();
        let comment = cache.comment_post(new_comment(post.id)).await.unwrap();
        let comments = QueryKey::PostComments { post_id: post.id };

        cache.posts().await.unwrap();
        cache.post_comments(post.id).await.unwrap();
        cache.create_post(new_post("q")).await.unwrap();
        assert_eq!(cache.is_stale(&QueryKey::Posts), Some(true));
        assert_eq!(cache.is_stale(&comments), Some(false));

        cache.up_vote(comment.id).await.unwrap();
        assert_eq!(cache.is_stale(&comments), Some(true));
        let voted = cache.post_comments(post.id).await.unwrap();
        assert_eq!(voted.items().next().map(|c| c.votes), Some(1));

        cache.down_vote(comment.id).await.unwrap();
        cache.down_vote(comment.id).await.unwrap();
        let voted = cache.post_comments(post.id).await.unwrap();
        assert_eq!(voted.items().next().map(|c| c.votes), Some(-1));

        cache.comment_post(new_comment(post.id)).await.unwrap();
        assert_eq!(cache.post_comments(post.id).await.unwrap().items().count(), 2);
    }

    #[tokio::test]
    async fn invalidated_infinite_query_reloads_as_many_pages() {
        let (transport, cache) = cache(2);
        for i in 0..4 {
            cache.create_post(new_post(&i.to_string())).await.unwrap();
        }
        cache.posts().await.unwrap();
        cache.fetch_next_posts().await.unwrap();
        cache.create_post(new_post("new")).await.unwrap();
        let calls = transport.num_calls();
        let posts = cache.posts().await.unwrap();
        assert_eq!(transport.num_calls(), calls + 2);
        assert_eq!(titles(&posts), vec!["new", "3", "2", "1"]);
        assert!(posts.has_next_page());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let transport = MockTransport::new(10);
        let cache = QueryCache::new(RpcClient::new(transport.clone())).with_page_size(0);
        for _ in 0..2 {
            assert_eq!(
                cache.posts().await,
                Err(ClientError::Api(Error::InvalidPageSize(0)))
            );
        }
        assert_eq!(transport.num_calls(), 2);
        assert_eq!(cache.is_stale(&QueryKey::Posts), None);

        let res = cache.comment_post(new_comment(PostId::stub())).await;
        assert_eq!(res, Err(ClientError::Api(Error::PostNotFound(PostId::stub()))));
    }

    #[tokio::test]
    async fn transport_failure_reaches_every_caller() {
        let cache = QueryCache::new(RpcClient::new(DownTransport));
        let (posts, post) = tokio::join!(cache.posts(), cache.post(PostId::stub()));
        let down = ClientError::Transport(String::from("connection refused"));
        assert_eq!(posts, Err(down.clone()));
        assert_eq!(post, Err(down));
    }
}
