use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::{
    api::{
        Call, CallResult, Comment, CommentRef, CommentRepliesPage, Error, NewComment, NewPost,
        NewReply, Page, Post, PostCommentsPage, PostRef, PostsPage,
    },
    ClientError,
};

/// Something able to run a batch of calls, answering one result per call, in order
#[async_trait]
pub trait Transport: 'static + Send + Sync {
    async fn batch(&self, calls: Vec<Call>) -> Result<Vec<CallResult>, ClientError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    host: String,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>) -> HttpTransport {
        HttpTransport {
            client: reqwest::Client::new(),
            host: host.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn batch(&self, calls: Vec<Call>) -> Result<Vec<CallResult>, ClientError> {
        let resp = self
            .client
            .post(format!("{}/api/batch", self.host))
            .json(&calls)
            .send()
            .await
            .map_err(ClientError::transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(ClientError::transport)?;
        if !status.is_success() {
            return Err(match Error::parse(&body) {
                Ok(e) => ClientError::Api(e),
                Err(_) => ClientError::Transport(format!("server answered {status}")),
            });
        }
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::Transport(format!("parsing batch response: {e}")))
    }
}

type Reply = oneshot::Sender<Result<serde_json::Value, ClientError>>;

/// Sends calls through a `Transport`, gathering all the calls issued within the same
/// scheduler tick into a single batch
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<Vec<(Call, Reply)>>>,
}

impl RpcClient {
    pub fn new(transport: impl Transport) -> RpcClient {
        RpcClient {
            transport: Arc::new(transport),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn call(&self, call: Call) -> Result<serde_json::Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        let first_of_batch = {
            let mut pending = self.pending.lock();
            pending.push((call, tx));
            pending.len() == 1
        };
        if first_of_batch {
            // flushing from a separate task, so that dropping this future does not
            // strand the other calls of the batch
            let this = self.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                this.flush().await
            });
        }
        rx.await
            .map_err(|_| ClientError::Transport(String::from("batch was dropped")))?
    }

    async fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return;
        }
        let (calls, replies): (Vec<Call>, Vec<Reply>) = batch.into_iter().unzip();
        let num_calls = calls.len();
        let num_mutations = calls.iter().filter(|c| c.is_mutation()).count();
        tracing::debug!(num_calls, num_mutations, "sending batch");
        let err = match self.transport.batch(calls).await {
            Ok(results) if results.len() == num_calls => {
                for (res, reply) in results.into_iter().zip(replies) {
                    // the caller may have given up waiting
                    let _ = reply.send(res.into_result().map_err(ClientError::Api));
                }
                return;
            }
            Ok(results) => ClientError::Transport(format!(
                "sent {num_calls} calls but received {} results",
                results.len()
            )),
            Err(e) => e,
        };
        tracing::error!(?err, num_calls, "batch failed");
        for reply in replies {
            let _ = reply.send(Err(err.clone()));
        }
    }

    pub async fn typed<T>(&self, call: Call) -> Result<T, ClientError>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let op = call.name();
        let res = self.call(call).await?;
        serde_json::from_value(res)
            .map_err(|e| ClientError::Transport(format!("parsing result of {op}: {e}")))
    }

    pub async fn create_post(&self, p: NewPost) -> Result<Post, ClientError> {
        self.typed(Call::CreatePost(p)).await
    }

    pub async fn get_posts(&self, q: PostsPage) -> Result<Page<Post>, ClientError> {
        self.typed(Call::GetPosts(q)).await
    }

    pub async fn get_post(&self, q: PostRef) -> Result<Option<Post>, ClientError> {
        self.typed(Call::GetPost(q)).await
    }

    pub async fn comment_post(&self, c: NewComment) -> Result<Comment, ClientError> {
        self.typed(Call::CommentPost(c)).await
    }

    pub async fn get_post_comments(
        &self,
        q: PostCommentsPage,
    ) -> Result<Page<Comment>, ClientError> {
        self.typed(Call::GetPostComments(q)).await
    }

    pub async fn reply_comment(&self, r: NewReply) -> Result<Comment, ClientError> {
        self.typed(Call::ReplyComment(r)).await
    }

    pub async fn get_comment_replies(
        &self,
        q: CommentRepliesPage,
    ) -> Result<Page<Comment>, ClientError> {
        self.typed(Call::GetCommentReplies(q)).await
    }

    pub async fn up_vote(&self, c: CommentRef) -> Result<Comment, ClientError> {
        self.typed(Call::UpVotePost(c)).await
    }

    pub async fn down_vote(&self, c: CommentRef) -> Result<Comment, ClientError> {
        self.typed(Call::DownVotePost(c)).await
    }
}
