use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use uuid::Uuid;

const NUM_AUTHORS: usize = 8;

const NUM_POSTS: usize = 40;
const POST_TITLE_WORDS: usize = 8;
const POST_CONTENT_WORDS: usize = 120;

const NUM_COMMENTS: usize = 400;
/// Out of 100, how likely a comment is to answer another comment rather than the post
const REPLY_PERCENT: u32 = 60;
const COMMENT_WORDS: usize = 30;

const HISTORY_DAYS: i64 = 30;

struct Comment {
    id: Uuid,
    post: usize,
    in_reply_to: Option<usize>,
    author: usize,
    content: String,
    created_at: DateTime<Utc>,
    reply_count: usize,
    votes: i64,
}

fn gen_n_items(table: &str, columns: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    if n == 0 {
        return;
    }
    println!("INSERT INTO {} ({}) VALUES", table, columns);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn timestamp(t: &DateTime<Utc>) -> String {
    quote(&t.to_rfc3339())
}

/// A random point in time between `after` and now
fn gen_time_after(rng: &mut impl Rng, after: DateTime<Utc>) -> DateTime<Utc> {
    let span = (Utc::now() - after).num_seconds().max(1);
    after + Duration::seconds(rng.gen_range(1..=span))
}

fn main() {
    let mut rng = rand::thread_rng();
    let authors = (0..NUM_AUTHORS)
        .map(|_| lipsum::lipsum_words_with_rng(&mut rng, 1).to_lowercase())
        .collect::<Vec<_>>();
    let start = Utc::now() - Duration::days(HISTORY_DAYS);

    // Generate posts
    let mut posts = (0..NUM_POSTS)
        .map(|_| {
            (
                Uuid::new_v4(),
                gen_time_after(&mut rng, start),
                rng.gen_range(0..NUM_AUTHORS),
            )
        })
        .collect::<Vec<_>>();
    posts.sort_by_key(|&(_, created_at, _)| created_at);
    gen_n_items(
        "posts",
        "id, title, author, content, created_at",
        NUM_POSTS,
        |i| {
            let (id, created_at, author) = posts[i];
            format!(
                "('{}', {}, {}, {}, {})",
                id,
                quote(&lipsum::lipsum_words_with_rng(&mut rng, POST_TITLE_WORDS)),
                quote(&authors[author]),
                quote(&lipsum::lipsum_words_with_rng(&mut rng, POST_CONTENT_WORDS)),
                timestamp(&created_at),
            )
        },
    );

    // Generate comments, each one after the one it answers
    let mut comments: Vec<Comment> = Vec::with_capacity(NUM_COMMENTS);
    for _ in 0..NUM_COMMENTS {
        let is_reply = !comments.is_empty() && rng.gen_ratio(REPLY_PERCENT, 100);
        let (post, in_reply_to, after) = match is_reply {
            true => {
                let parent = rng.gen_range(0..comments.len());
                comments[parent].reply_count += 1;
                let p = &comments[parent];
                (p.post, Some(parent), p.created_at)
            }
            false => {
                let post = rng.gen_range(0..NUM_POSTS);
                (post, None, posts[post].1)
            }
        };
        comments.push(Comment {
            id: Uuid::new_v4(),
            post,
            in_reply_to,
            author: rng.gen_range(0..NUM_AUTHORS),
            content: lipsum::lipsum_words_with_rng(&mut rng, COMMENT_WORDS),
            created_at: gen_time_after(&mut rng, after),
            reply_count: 0,
            votes: rng.gen_range(-5..=20),
        });
    }
    // parents must be inserted before their replies
    let mut order = (0..comments.len()).collect::<Vec<_>>();
    order.sort_by_key(|&i| depth(&comments, i));
    gen_n_items(
        "comments",
        "id, post_id, in_reply_to_id, author, content, created_at, reply_count, votes",
        comments.len(),
        |i| {
            let c = &comments[order[i]];
            format!(
                "('{}', '{}', {}, {}, {}, {}, {}, {})",
                c.id,
                posts[c.post].0,
                match c.in_reply_to {
                    Some(parent) => format!("'{}'", comments[parent].id),
                    None => String::from("NULL"),
                },
                quote(&authors[c.author]),
                quote(&c.content),
                timestamp(&c.created_at),
                c.reply_count,
                c.votes,
            )
        },
    );
}

fn depth(comments: &[Comment], mut i: usize) -> usize {
    let mut depth = 0;
    while let Some(parent) = comments[i].in_reply_to {
        depth += 1;
        i = parent;
    }
    depth
}
