use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use burogu_api::{AuthToken, Uuid};

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;
mod images;
mod mailer;

pub use error::Error;
pub use extractors::{AppState, PgPool};
pub use images::ImageStore;
pub use mailer::Mailer;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

pub async fn create_sqlx_pool(url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await
            .with_context(|| format!("opening database {url:?}"))?,
    ))
}

pub async fn app(
    db: PgPool,
    mailer: Mailer,
    images: ImageStore,
    admin_token: Option<AuthToken>,
) -> Router {
    Router::new()
        .route("/api/users/signup", post(handlers::signup))
        .route("/api/users/signin", post(handlers::signin))
        .route("/api/users/logout", post(handlers::logout))
        .route("/api/verifymail", post(handlers::verify_email))
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route("/api/addpost", post(handlers::add_post))
        .route("/api/allpost", get(handlers::all_posts))
        .route("/api/singlepost/:id", get(handlers::single_post))
        .route("/api/singleuserpost/:userid", get(handlers::user_posts))
        .route("/api/edituserpost", put(handlers::edit_post))
        .route("/api/deletepost", delete(handlers::delete_post))
        .route("/api/comments", post(handlers::create_comment))
        .route("/api/getcomments/:postId", get(handlers::get_comments))
        .route("/api/deletecomment/:commentId", delete(handlers::delete_comment))
        .route("/api/updatecomment", put(handlers::update_comment))
        .route("/api/comments/like", put(handlers::like_comment))
        .route("/api/comments/:commentId/reply", post(handlers::create_reply))
        .route(
            "/api/comments/:commentId/reply/:replyId",
            delete(handlers::delete_reply),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(AppState {
            db,
            mailer,
            images,
            admin_token,
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();
    tracing_subscriber::fmt::init();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = create_sqlx_pool(&db_url).await?;
    MIGRATOR
        .run(&mut *db.acquire().await?)
        .await
        .context("applying migrations")?;

    let admin_token = match std::env::var("ADMIN_TOKEN") {
        Ok(token) => Some(AuthToken(
            Uuid::try_parse(&token).context("parsing ADMIN_TOKEN as an auth token")?,
        )),
        Err(_) => None,
    };
    let mailer = Mailer::from_env()?;
    let images = ImageStore::from_env()?;

    let app = app(db, mailer, images, admin_token).await;
    tracing::info!("listening on {}", opt.bind);
    axum::Server::bind(&opt.bind)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
