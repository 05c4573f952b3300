use agora_client::{
    api::{Comment, CommentId, NewComment, NewPost, NewReply, Post, PostId, Uuid},
    HttpTransport, Infinite, QueryCache, RpcClient,
};
use anyhow::Context;
use async_recursion::async_recursion;

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, env = "AGORA_HOST", default_value = "http://127.0.0.1:3000")]
    host: String,

    /// Number of items to request per page, the server's default if unset
    #[structopt(long)]
    page_size: Option<u32>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a post
    CreatePost {
        #[structopt(short, long)]
        author: String,

        title: String,

        content: String,
    },

    /// List posts, newest first
    Posts {
        /// Number of pages to load
        #[structopt(long, default_value = "1")]
        pages: usize,
    },

    /// Show a post with its threaded comments
    Post {
        id: Uuid,

        /// How many levels of replies to expand
        #[structopt(long, default_value = "3")]
        depth: usize,
    },

    /// Comment on a post
    Comment {
        #[structopt(short, long)]
        author: String,

        post: Uuid,

        content: String,
    },

    /// Reply to a comment
    Reply {
        #[structopt(short, long)]
        author: String,

        post: Uuid,

        comment: Uuid,

        content: String,
    },

    /// List all the replies to a comment
    Replies { post: Uuid, comment: Uuid },

    Upvote { comment: Uuid },

    Downvote { comment: Uuid },
}

fn print_post(p: &Post) {
    println!(
        "{} {} (by {}, {})",
        p.id.0,
        p.title,
        p.author,
        p.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_comment(c: &Comment, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} {:+} {} ({} replies, {})",
        c.id.0,
        c.votes,
        c.author,
        c.reply_count,
        c.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    for line in c.content.lines() {
        println!("{indent}  | {line}");
    }
}

async fn all_comments(cache: &QueryCache, post: PostId) -> anyhow::Result<Infinite<Comment>> {
    let mut comments = cache.post_comments(post).await?;
    while comments.has_next_page() {
        comments = cache.fetch_next_post_comments(post).await?;
    }
    Ok(comments)
}

async fn all_replies(
    cache: &QueryCache,
    post: PostId,
    comment: CommentId,
) -> anyhow::Result<Infinite<Comment>> {
    let mut replies = cache.comment_replies(post, comment).await?;
    while replies.has_next_page() {
        replies = cache.fetch_next_comment_replies(post, comment).await?;
    }
    Ok(replies)
}

#[async_recursion]
async fn print_thread(
    cache: &QueryCache,
    comment: &Comment,
    depth: usize,
    max_depth: usize,
) -> anyhow::Result<()> {
    print_comment(comment, depth);
    if comment.reply_count == 0 {
        return Ok(());
    }
    if depth + 1 >= max_depth {
        println!("{}  ...", "  ".repeat(depth + 1));
        return Ok(());
    }
    let replies = all_replies(cache, comment.post_id, comment.id).await?;
    for r in replies.items() {
        print_thread(cache, r, depth + 1, max_depth).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let rpc = RpcClient::new(HttpTransport::new(opt.host.trim_end_matches('/')));
    let cache = match opt.page_size {
        Some(page_size) => QueryCache::new(rpc).with_page_size(page_size),
        None => QueryCache::new(rpc),
    };

    match opt.cmd {
        Command::CreatePost {
            author,
            title,
            content,
        } => {
            let post = cache
                .create_post(NewPost {
                    title,
                    author,
                    content,
                })
                .await
                .context("creating post")?;
            print_post(&post);
        }
        Command::Posts { pages } => {
            let mut posts = cache.posts().await.context("listing posts")?;
            while posts.pages.len() < pages && posts.has_next_page() {
                posts = cache
                    .fetch_next_posts()
                    .await
                    .context("listing more posts")?;
            }
            for p in posts.items() {
                print_post(p);
            }
            if posts.has_next_page() {
                println!("...");
            }
        }
        Command::Post { id, depth } => {
            let id = PostId(id);
            let post = cache
                .post(id)
                .await
                .context("fetching post")?
                .with_context(|| format!("post {id:?} does not exist"))?;
            print_post(&post);
            println!();
            for line in post.content.lines() {
                println!("{line}");
            }
            println!();
            let comments = all_comments(&cache, id)
                .await
                .context("listing comments")?;
            for c in comments.items() {
                print_thread(&cache, c, 0, depth).await?;
            }
        }
        Command::Comment {
            author,
            post,
            content,
        } => {
            let comment = cache
                .comment_post(NewComment {
                    post_id: PostId(post),
                    author,
                    content,
                })
                .await
                .context("commenting")?;
            print_comment(&comment, 0);
        }
        Command::Reply {
            author,
            post,
            comment,
            content,
        } => {
            let reply = cache
                .reply_comment(NewReply {
                    post_id: PostId(post),
                    in_reply_to_id: CommentId(comment),
                    author,
                    content,
                })
                .await
                .context("replying")?;
            print_comment(&reply, 0);
        }
        Command::Replies { post, comment } => {
            let replies = all_replies(&cache, PostId(post), CommentId(comment))
                .await
                .context("listing replies")?;
            for r in replies.items() {
                print_comment(r, 0);
            }
        }
        Command::Upvote { comment } => {
            let comment = cache
                .up_vote(CommentId(comment))
                .await
                .context("upvoting")?;
            print_comment(&comment, 0);
        }
        Command::Downvote { comment } => {
            let comment = cache
                .down_vote(CommentId(comment))
                .await
                .context("downvoting")?;
            print_comment(&comment, 0);
        }
    }

    Ok(())
}
