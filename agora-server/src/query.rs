use agora_api::{CommentId, Cursor, PostId, Time, Uuid};
use sqlx::{postgres::PgArguments, query::QueryAs, Postgres};

pub enum Bind {
    Uuid(Uuid),
    Time(Time),
    Int(i64),
}

/// Which rows a paginated listing walks through
#[derive(Clone, Copy, Debug)]
pub enum Scope {
    Posts,
    TopLevelComments(PostId),
    Replies(PostId, CommentId),
}

impl Scope {
    pub fn table(&self) -> &'static str {
        match self {
            Scope::Posts => "posts",
            Scope::TopLevelComments(_) | Scope::Replies(..) => "comments",
        }
    }
}

#[derive(Default)]
pub struct Sql {
    pub where_clause: String,
    pub binds: Vec<Bind>,
}

impl Sql {
    /// Adds a Bind, returning the index that should be used to refer to it
    fn add_bind(&mut self, b: Bind) -> usize {
        self.binds.push(b);
        self.binds.len()
    }

    /// Restricts to rows strictly older than `cursor` in (created_at, id) order
    pub fn add_cursor(&mut self, cursor: &Cursor) {
        let date = self.add_bind(Bind::Time(cursor.created_at()));
        let id = self.add_bind(Bind::Uuid(cursor.id()));
        self.where_clause
            .push_str(&format!(" AND (created_at, id) < (${date}, ${id})"));
    }

    /// Oldest row of the scope, used to tell whether a page is the last one
    pub fn oldest(&self, table: &str) -> String {
        format!(
            "SELECT * FROM {table} WHERE {} ORDER BY created_at ASC, id ASC LIMIT 1",
            self.where_clause
        )
    }

    /// Consumes the limit bind, so must be called after all other restrictions are added
    pub fn newest_first(&mut self, table: &str, limit: u32) -> String {
        let idx = self.add_bind(Bind::Int(i64::from(limit)));
        format!(
            "SELECT * FROM {table} WHERE {} ORDER BY created_at DESC, id DESC LIMIT ${idx}",
            self.where_clause
        )
    }

    pub fn bind_all<'q, O>(
        &'q self,
        mut q: QueryAs<'q, Postgres, O, PgArguments>,
    ) -> QueryAs<'q, Postgres, O, PgArguments> {
        for b in &self.binds {
            q = match b {
                Bind::Uuid(u) => q.bind(*u),
                Bind::Time(t) => q.bind(*t),
                Bind::Int(i) => q.bind(*i),
            };
        }
        q
    }
}

pub fn to_postgres(scope: &Scope) -> Sql {
    let mut res = Sql::default();
    match scope {
        Scope::Posts => res.where_clause.push_str("true"),
        Scope::TopLevelComments(post) => {
            let idx = res.add_bind(Bind::Uuid(post.0));
            res.where_clause
                .push_str(&format!("post_id = ${idx} AND in_reply_to_id IS NULL"));
        }
        Scope::Replies(post, parent) => {
            let post = res.add_bind(Bind::Uuid(post.0));
            let parent = res.add_bind(Bind::Uuid(parent.0));
            res.where_clause
                .push_str(&format!("post_id = ${post} AND in_reply_to_id = ${parent}"));
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_scope_binds_in_order() {
        let mut sql = to_postgres(&Scope::Replies(PostId::stub(), CommentId::stub()));
        assert_eq!(sql.where_clause, "post_id = $1 AND in_reply_to_id = $2");
        sql.add_cursor(&Cursor::new(chrono::Utc::now(), Uuid::new_v4()));
        assert_eq!(
            sql.newest_first("comments", 10),
            "SELECT * FROM comments WHERE post_id = $1 AND in_reply_to_id = $2 \
             AND (created_at, id) < ($3, $4) ORDER BY created_at DESC, id DESC LIMIT $5"
        );
        assert_eq!(sql.binds.len(), 5);
    }

    #[test]
    fn posts_scope_has_no_binds() {
        let sql = to_postgres(&Scope::Posts);
        assert_eq!(
            sql.oldest(Scope::Posts.table()),
            "SELECT * FROM posts WHERE true ORDER BY created_at ASC, id ASC LIMIT 1"
        );
        assert!(sql.binds.is_empty());
    }
}
