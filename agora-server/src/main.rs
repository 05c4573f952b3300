use std::net::SocketAddr;

use anyhow::Context;
use axum::{routing::post, Router};
use structopt::StructOpt;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod query;

pub use error::Error;
use extractors::{AppState, PageSize, PgPool};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, StructOpt)]
#[structopt(name = "agora-server")]
struct Opt {
    /// PostgreSQL connection string
    #[structopt(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Address to listen on
    #[structopt(long, env = "AGORA_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Number of items returned by listings that do not ask for a page size
    #[structopt(long, env = "AGORA_PAGE_SIZE", default_value = "10")]
    page_size: u32,

    /// Maximum number of connections to the database
    #[structopt(long, env = "AGORA_MAX_CONNECTIONS", default_value = "10")]
    max_connections: u32,
}

pub async fn create_sqlx_pool(db_url: &str, max_connections: u32) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await
        .with_context(|| format!("Error opening database {:?}", db_url))
}

pub fn app(db: PgPool, page_size: PageSize) -> Router {
    Router::new()
        .route("/api/batch", post(handlers::batch))
        .route("/api/:op", post(handlers::single_call))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState { db, page_size })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = Opt::from_args();
    agora_api::validate_page_size(Some(opt.page_size)).context("validating --page-size")?;

    let db = create_sqlx_pool(&opt.database_url, opt.max_connections).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("applying database migrations")?;

    let app = app(PgPool::new(db), PageSize(opt.page_size));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
