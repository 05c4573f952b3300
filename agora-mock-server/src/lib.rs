use std::{cmp::Reverse, collections::BTreeMap};

use agora_api::{
    Call, CallResult, Comment, CommentId, CommentRef, CommentRepliesPage, Cursor, Error,
    NewComment, NewPost, NewReply, Page, Paginated, Post, PostCommentsPage, PostId, PostRef,
    PostsPage, Time, Uuid, DEFAULT_PAGE_SIZE,
};
use chrono::{Duration, SubsecRound, Utc};

/// In-memory model of the agora server
pub struct MockServer {
    page_size: u32,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    last_time: Option<Time>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: u32) -> MockServer {
        MockServer {
            page_size,
            posts: BTreeMap::new(),
            comments: BTreeMap::new(),
            last_time: None,
        }
    }

    /// Strictly increasing timestamps, at the precision the real store keeps
    fn now(&mut self) -> Time {
        let now = Utc::now().trunc_subsecs(6);
        let now = match self.last_time {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_time = Some(now);
        now
    }

    fn paginate<'a, T, I>(
        &self,
        items: I,
        cursor: &Option<Cursor>,
        page_size: Option<u32>,
    ) -> Page<T>
    where
        T: 'a + Clone + Paginated,
        I: Iterator<Item = &'a T>,
    {
        let position = |t: &T| {
            let p = t.position();
            (p.created_at(), p.id())
        };
        let mut all = items.collect::<Vec<_>>();
        all.sort_unstable_by_key(|t| Reverse(position(*t)));
        let oldest = all.last().copied();
        let page = all
            .iter()
            .filter(|t| match cursor {
                None => true,
                Some(c) => position(**t) < (c.created_at(), c.id()),
            })
            .take(page_size.unwrap_or(self.page_size) as usize)
            .map(|t| (*t).clone())
            .collect();
        Page::new(page, oldest)
    }

    pub fn create_post(&mut self, p: NewPost) -> Result<Post, Error> {
        p.validate()?;
        let post = Post {
            id: PostId(Uuid::new_v4()),
            title: p.title,
            author: p.author,
            content: p.content,
            created_at: self.now(),
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    pub fn get_posts(&self, q: PostsPage) -> Result<Page<Post>, Error> {
        q.validate()?;
        Ok(self.paginate(self.posts.values(), &q.cursor, q.page_size))
    }

    pub fn get_post(&self, q: PostRef) -> Result<Option<Post>, Error> {
        Ok(self.posts.get(&q.id).cloned())
    }

    pub fn comment_post(&mut self, c: NewComment) -> Result<Comment, Error> {
        c.validate()?;
        if !self.posts.contains_key(&c.post_id) {
            return Err(Error::PostNotFound(c.post_id));
        }
        let comment = Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: c.post_id,
            in_reply_to_id: None,
            author: c.author,
            content: c.content,
            created_at: self.now(),
            reply_count: 0,
            votes: 0,
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    pub fn get_post_comments(&self, q: PostCommentsPage) -> Result<Page<Comment>, Error> {
        q.validate()?;
        let scope = self
            .comments
            .values()
            .filter(|c| c.post_id == q.post_id && c.in_reply_to_id.is_none());
        Ok(self.paginate(scope, &q.cursor, q.page_size))
    }

    pub fn reply_comment(&mut self, r: NewReply) -> Result<Comment, Error> {
        r.validate()?;
        match self.comments.get(&r.in_reply_to_id) {
            Some(parent) if parent.post_id == r.post_id => (),
            _ => return Err(Error::CommentNotFound(r.in_reply_to_id)),
        }
        let reply = Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: r.post_id,
            in_reply_to_id: Some(r.in_reply_to_id),
            author: r.author,
            content: r.content,
            created_at: self.now(),
            reply_count: 0,
            votes: 0,
        };
        if let Some(parent) = self.comments.get_mut(&r.in_reply_to_id) {
            parent.reply_count += 1;
        }
        self.comments.insert(reply.id, reply.clone());
        Ok(reply)
    }

    pub fn get_comment_replies(&self, q: CommentRepliesPage) -> Result<Page<Comment>, Error> {
        q.validate()?;
        let scope = self
            .comments
            .values()
            .filter(|c| c.post_id == q.post_id && c.in_reply_to_id == Some(q.in_reply_to_id));
        Ok(self.paginate(scope, &q.cursor, q.page_size))
    }

    fn vote(&mut self, id: CommentId, delta: i64) -> Result<Comment, Error> {
        let c = self
            .comments
            .get_mut(&id)
            .ok_or(Error::CommentNotFound(id))?;
        c.votes += delta;
        Ok(c.clone())
    }

    pub fn up_vote(&mut self, c: CommentRef) -> Result<Comment, Error> {
        self.vote(c.id, 1)
    }

    pub fn down_vote(&mut self, c: CommentRef) -> Result<Comment, Error> {
        self.vote(c.id, -1)
    }

    pub fn call(&mut self, call: Call) -> Result<serde_json::Value, Error> {
        call.validate()?;
        macro_rules! to_json {
            ($e:expr) => {
                serde_json::to_value($e?).map_err(|e| Error::Unknown(e.to_string()))
            };
        }
        match call {
            Call::CreatePost(p) => to_json!(self.create_post(p)),
            Call::GetPosts(q) => to_json!(self.get_posts(q)),
            Call::GetPost(q) => to_json!(self.get_post(q)),
            Call::CommentPost(c) => to_json!(self.comment_post(c)),
            Call::GetPostComments(q) => to_json!(self.get_post_comments(q)),
            Call::ReplyComment(r) => to_json!(self.reply_comment(r)),
            Call::GetCommentReplies(q) => to_json!(self.get_comment_replies(q)),
            Call::UpVotePost(c) => to_json!(self.up_vote(c)),
            Call::DownVotePost(c) => to_json!(self.down_vote(c)),
        }
    }

    pub fn batch(&mut self, calls: Vec<serde_json::Value>) -> Vec<CallResult> {
        calls
            .into_iter()
            .map(|c| CallResult::from(Call::from_json(c).and_then(|c| self.call(c))))
            .collect()
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
