#![cfg(test)]

use async_recursion::async_recursion;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
    Router,
};
use burogu_api::{
    Ack, AuthToken, CommentId, CommentInfo, CommentList, DeletePost, EditComment,
    Error as ApiError, LikeComment, LikeOutcome, NewComment, NewReply, NewSession, NewUser,
    PostId, PostInfo, ReplyId, ReplyInfo, SessionInfo, SignUp, UserId, Uuid,
};
use burogu_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

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

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let Some(cluster) = build_pg_cluster(datadir_path) else {
                eprintln!(
                    "skipping {}: postgresql seems to not be installed in path",
                    stringify!($name)
                );
                return;
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path)).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
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
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

do_tokio_test!(fuzz_signup_validation, SignUp, |data: SignUp| async move {
    let res = data.validate();
    if data.username.is_empty() || data.password.is_empty() || data.email.is_empty() {
        assert!(res.is_err(), "accepted signup with a missing field");
    }
    if let Err(e) = res {
        // validation failures must stay inside the 400 family
        assert_eq!(e.status_code(), http::StatusCode::BAD_REQUEST);
    }
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        n: usize,
        #[generator(bolero::generator::gen_with::<String>().len(1..20usize))]
        password: String,
    },
    SignUp {
        n: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        password: String,
    },
    Auth {
        uid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(1..20usize))]
        device: String,
    },
    Unauth {
        sid: usize,
    },
    AddPost {
        sid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        title: String,
        #[generator(bolero::generator::gen_with::<String>().len(1..50usize))]
        content: String,
    },
    DeletePost {
        sid: usize,
        pid: usize,
    },
    CreateComment {
        sid: usize,
        pid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        content: String,
    },
    GetComments {
        pid: usize,
    },
    EditComment {
        sid: usize,
        cid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        content: String,
    },
    DeleteComment {
        sid: usize,
        cid: usize,
    },
    LikeComment {
        sid: usize,
        cid: usize,
    },
    Reply {
        sid: usize,
        cid: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..50usize))]
        content: String,
        mention: Option<usize>,
    },
    DeleteReply {
        sid: usize,
        rid: usize,
    },
}

const MULTIPART_BOUNDARY: &str = "fuzz-boundary";

/// Keep generated text out of collision with the fixed multipart boundary
fn sanitize(s: &str) -> String {
    s.replace(MULTIPART_BOUNDARY, "")
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, data)) = file {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
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
    if status.is_success() {
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

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

async fn run_form_on_app<Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> Result<Resp, ApiError>
where
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        );
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(multipart_body(fields, file)))
        .expect("building request");
    call(app, req, &fields).await
}

fn compare<T, E>(name: &str, app_res: Result<T, E>, mock_res: Result<T, E>)
where
    T: Debug + PartialEq,
    E: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

/// Server-generated ids differ between the app and the mock, so errors are
/// compared by kind only
fn kind(e: ApiError) -> &'static str {
    match e {
        ApiError::Unknown(_) => "unknown",
        ApiError::MissingField(_) => "missing-field",
        ApiError::NullByteInString(_) => "null-byte",
        ApiError::InvalidEmail(_) => "invalid-email",
        ApiError::InvalidId(_) => "invalid-id",
        ApiError::EmptyEdit => "empty-edit",
        ApiError::InvalidToken => "invalid-token",
        ApiError::PermissionDenied => "permission-denied",
        ApiError::EmailNotVerified => "email-not-verified",
        ApiError::InvalidCredentials => "invalid-credentials",
        ApiError::NameAlreadyUsed(_) => "conflict-name",
        ApiError::EmailAlreadyUsed(_) => "conflict-email",
        ApiError::UserNotFound(_) => "user-not-found",
        ApiError::PostNotFound(_) => "post-not-found",
        ApiError::CommentNotFound(_) => "comment-not-found",
        ApiError::ReplyNotFound(_) => "reply-not-found",
    }
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

struct Session {
    app: AuthToken,
    mock: AuthToken,
}

struct PostPair {
    app: PostId,
    mock: PostId,
}

struct CommentPair {
    app: CommentId,
    mock: CommentId,
}

struct ReplyPair {
    app: ReplyId,
    mock: ReplyId,
    app_comment: CommentId,
    mock_comment: CommentId,
}

/// Projection of a comment onto its deterministic parts (ids and timestamps
/// are server-generated and excluded; the like set is order-insensitive)
fn comment_shape(
    c: burogu_api::Comment,
) -> (UserId, String, String, Vec<UserId>, Vec<(UserId, String, Option<UserId>, Option<String>, String)>) {
    let mut likes = c.liked_by;
    likes.sort();
    (
        c.author,
        c.author_name,
        c.content,
        likes,
        c.replies
            .into_iter()
            .map(|r| {
                (
                    r.author,
                    r.author_name,
                    r.mentioned_user,
                    r.mentioned_user_name,
                    r.content,
                )
            })
            .collect(),
    )
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    sessions: Vec<Session>,
    users: Vec<UserId>,
    posts: Vec<PostPair>,
    comments: Vec<CommentPair>,
    replies: Vec<ReplyPair>,
}

impl ComparativeFuzzer {
    async fn new(pool: PgPool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        let app = app(
            pool,
            Mailer::log(),
            ImageStore::stub(),
            Some(AuthToken(admin_token)),
        )
        .await;
        ComparativeFuzzer {
            admin_token,
            app,
            mock: MockServer::new(),
            sessions: Vec::new(),
            users: Vec::new(),
            posts: Vec::new(),
            comments: Vec::new(),
            replies: Vec::new(),
        }
    }

    fn session(&self, sid: usize) -> Option<&Session> {
        resize_int(sid, ..self.sessions.len()).map(|sid| &self.sessions[sid])
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { n, password } => {
                let new_user = NewUser::new(
                    UserId(Uuid::new_v4()),
                    format!("user-{}", n % 8),
                    format!("user-{}@example.com", n % 8),
                    password,
                );
                let id = new_user.id;
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/admin/create-user",
                    Some(self.admin_token),
                    &new_user,
                )
                .await;
                let mock_res = self.mock.admin_create_user(new_user);
                if let (Ok(_), Ok(_)) = (&app_res, &mock_res) {
                    self.users.push(id);
                }
                compare(
                    "CreateUser",
                    app_res.map_err(kind),
                    mock_res.map_err(kind),
                );
            }
            FuzzOp::SignUp { n, password } => {
                let data = SignUp {
                    username: format!("user-{}", n % 8),
                    email: format!("user-{}@example.com", n % 8),
                    password,
                };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/users/signup",
                    None,
                    &data,
                )
                .await;
                let mock_res = self.mock.signup(data);
                compare("SignUp", app_res.map_err(kind), mock_res.map_err(kind));
            }
            FuzzOp::Auth { uid, device } => {
                if let Some(uid) = resize_int(uid, ..self.mock.test_num_users()) {
                    let (user, password) = self.mock.test_get_user_info(uid);
                    let session = NewSession {
                        user: String::from(user),
                        password: String::from(password),
                        device,
                    };
                    let app_res: Result<SessionInfo, ApiError> = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/users/signin",
                        None,
                        &session,
                    )
                    .await;
                    let mock_res = self.mock.signin(session);
                    if let (&Ok(ref app), &Ok(ref mock)) = (&app_res, &mock_res) {
                        self.sessions.push(Session {
                            app: app.access_token,
                            mock: mock.access_token,
                        });
                    }
                    compare(
                        "Auth",
                        app_res.map(|s| (s.message, s.user)).map_err(kind),
                        mock_res.map(|s| (s.message, s.user)).map_err(kind),
                    );
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser {
                        n: uid,
                        password: String::from("password"),
                    })
                    .await;
                    self.execute_fuzz_op(FuzzOp::Auth { uid, device }).await;
                }
            }
            FuzzOp::Unauth { sid } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/users/logout",
                    Some(app_tok.0),
                    &(),
                )
                .await;
                let mock_res = self.mock.logout(mock_tok);
                compare("Unauth", app_res.map_err(kind), mock_res.map_err(kind));
            }
            FuzzOp::AddPost { sid, title, content } => {
                // One bounded attempt at getting a session first; a stub token
                // still compares fine (permission denied on both sides)
                if self.sessions.is_empty() {
                    self.execute_fuzz_op(FuzzOp::Auth {
                        uid: sid,
                        device: String::from("fuzzer"),
                    })
                    .await;
                }
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let title = sanitize(&title);
                let content = sanitize(&content);
                let app_res: Result<PostInfo, ApiError> = run_form_on_app(
                    &mut self.app,
                    "POST",
                    "/api/addpost",
                    Some(app_tok.0),
                    &[("title", &title), ("content", &content)],
                    Some(("cover.png", b"not-actually-a-png")),
                )
                .await;
                let mock_res = self.mock.add_post(mock_tok, title, content, "cover.png");
                if let (&Ok(ref app), &Ok(ref mock)) = (&app_res, &mock_res) {
                    self.posts.push(PostPair {
                        app: app.post.id,
                        mock: mock.post.id,
                    });
                }
                compare(
                    "AddPost",
                    app_res
                        .map(|p| (p.message, p.post.author, p.post.title, p.post.content))
                        .map_err(kind),
                    mock_res
                        .map(|p| (p.message, p.post.author, p.post.title, p.post.content))
                        .map_err(kind),
                );
            }
            FuzzOp::DeletePost { sid, pid } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_post, mock_post) = match resize_int(pid, ..self.posts.len()) {
                    Some(pid) => (self.posts[pid].app, self.posts[pid].mock),
                    None => (PostId::stub(), PostId::stub()),
                };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    "/api/deletepost",
                    Some(app_tok.0),
                    &DeletePost { post: app_post },
                )
                .await;
                let mock_res = self.mock.delete_post(mock_tok, DeletePost { post: mock_post });
                compare("DeletePost", app_res.map_err(kind), mock_res.map_err(kind));
            }
            FuzzOp::CreateComment { sid, pid, content } => {
                if self.posts.is_empty() {
                    self.execute_fuzz_op(FuzzOp::AddPost {
                        sid,
                        title: String::from("post for comments"),
                        content: String::from("content"),
                    })
                    .await;
                }
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_post, mock_post) = match resize_int(pid, ..self.posts.len()) {
                    Some(pid) => (self.posts[pid].app, self.posts[pid].mock),
                    None => (PostId::stub(), PostId::stub()),
                };
                let app_res: Result<CommentInfo, ApiError> = run_on_app(
                    &mut self.app,
                    "POST",
                    "/api/comments",
                    Some(app_tok.0),
                    &NewComment {
                        content: content.clone(),
                        post: app_post,
                    },
                )
                .await;
                let mock_res = self.mock.create_comment(
                    mock_tok,
                    NewComment {
                        content,
                        post: mock_post,
                    },
                );
                if let (&Ok(ref app), &Ok(ref mock)) = (&app_res, &mock_res) {
                    self.comments.push(CommentPair {
                        app: app.comment.id,
                        mock: mock.comment.id,
                    });
                }
                compare(
                    "CreateComment",
                    app_res
                        .map(|c| (c.message, comment_shape(c.comment)))
                        .map_err(kind),
                    mock_res
                        .map(|c| (c.message, comment_shape(c.comment)))
                        .map_err(kind),
                );
            }
            FuzzOp::GetComments { pid } => {
                let (app_post, mock_post) = match resize_int(pid, ..self.posts.len()) {
                    Some(pid) => (self.posts[pid].app, self.posts[pid].mock),
                    None => (PostId::stub(), PostId::stub()),
                };
                let app_res: Result<CommentList, ApiError> = run_on_app(
                    &mut self.app,
                    "GET",
                    &format!("/api/getcomments/{}", app_post.0),
                    None,
                    &(),
                )
                .await;
                let mock_res = self.mock.get_comments(mock_post);
                compare(
                    "GetComments",
                    app_res
                        .map(|l| {
                            (
                                l.message,
                                l.comments.into_iter().map(comment_shape).collect::<Vec<_>>(),
                            )
                        })
                        .map_err(kind),
                    mock_res
                        .map(|l| {
                            (
                                l.message,
                                l.comments.into_iter().map(comment_shape).collect::<Vec<_>>(),
                            )
                        })
                        .map_err(kind),
                );
            }
            FuzzOp::EditComment { sid, cid, content } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_comment, mock_comment) = match resize_int(cid, ..self.comments.len()) {
                    Some(cid) => (self.comments[cid].app, self.comments[cid].mock),
                    None => (CommentId::stub(), CommentId::stub()),
                };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "PUT",
                    "/api/updatecomment",
                    Some(app_tok.0),
                    &EditComment {
                        comment: app_comment,
                        content: content.clone(),
                    },
                )
                .await;
                let mock_res = self.mock.update_comment(
                    mock_tok,
                    EditComment {
                        comment: mock_comment,
                        content,
                    },
                );
                compare("EditComment", app_res.map_err(kind), mock_res.map_err(kind));
            }
            FuzzOp::DeleteComment { sid, cid } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_comment, mock_comment) = match resize_int(cid, ..self.comments.len()) {
                    Some(cid) => (self.comments[cid].app, self.comments[cid].mock),
                    None => (CommentId::stub(), CommentId::stub()),
                };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &format!("/api/deletecomment/{}", app_comment.0),
                    Some(app_tok.0),
                    &(),
                )
                .await;
                let mock_res = self.mock.delete_comment(mock_tok, mock_comment);
                compare(
                    "DeleteComment",
                    app_res.map_err(kind),
                    mock_res.map_err(kind),
                );
            }
            FuzzOp::LikeComment { sid, cid } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_comment, mock_comment) = match resize_int(cid, ..self.comments.len()) {
                    Some(cid) => (self.comments[cid].app, self.comments[cid].mock),
                    None => (CommentId::stub(), CommentId::stub()),
                };
                let app_res: Result<LikeOutcome, ApiError> = run_on_app(
                    &mut self.app,
                    "PUT",
                    "/api/comments/like",
                    Some(app_tok.0),
                    &LikeComment {
                        comment: app_comment,
                    },
                )
                .await;
                let mock_res = self.mock.like_comment(
                    mock_tok,
                    LikeComment {
                        comment: mock_comment,
                    },
                );
                compare("LikeComment", app_res.map_err(kind), mock_res.map_err(kind));
            }
            FuzzOp::Reply {
                sid,
                cid,
                content,
                mention,
            } => {
                if self.comments.is_empty() {
                    self.execute_fuzz_op(FuzzOp::CreateComment {
                        sid,
                        pid: cid,
                        content: String::from("comment for replies"),
                    })
                    .await;
                }
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_comment, mock_comment) = match resize_int(cid, ..self.comments.len()) {
                    Some(cid) => (self.comments[cid].app, self.comments[cid].mock),
                    None => (CommentId::stub(), CommentId::stub()),
                };
                let mentioned_user = mention.map(|m| match resize_int(m, ..self.users.len()) {
                    Some(m) => self.users[m],
                    None => UserId::stub(),
                });
                let app_res: Result<ReplyInfo, ApiError> = run_on_app(
                    &mut self.app,
                    "POST",
                    &format!("/api/comments/{}/reply", app_comment.0),
                    Some(app_tok.0),
                    &NewReply {
                        content: content.clone(),
                        mentioned_user,
                    },
                )
                .await;
                let mock_res = self.mock.create_reply(
                    mock_tok,
                    mock_comment,
                    NewReply {
                        content,
                        mentioned_user,
                    },
                );
                if let (&Ok(ref app), &Ok(ref mock)) = (&app_res, &mock_res) {
                    self.replies.push(ReplyPair {
                        app: app.reply.id,
                        mock: mock.reply.id,
                        app_comment,
                        mock_comment,
                    });
                }
                compare(
                    "Reply",
                    app_res
                        .map(|r| {
                            (
                                r.message,
                                r.reply.author,
                                r.reply.author_name,
                                r.reply.mentioned_user,
                                r.reply.mentioned_user_name,
                                r.reply.content,
                            )
                        })
                        .map_err(kind),
                    mock_res
                        .map(|r| {
                            (
                                r.message,
                                r.reply.author,
                                r.reply.author_name,
                                r.reply.mentioned_user,
                                r.reply.mentioned_user_name,
                                r.reply.content,
                            )
                        })
                        .map_err(kind),
                );
            }
            FuzzOp::DeleteReply { sid, rid } => {
                let (app_tok, mock_tok) = match self.session(sid) {
                    Some(s) => (s.app, s.mock),
                    None => (AuthToken::stub(), AuthToken::stub()),
                };
                let (app_uri, mock_comment, mock_reply) =
                    match resize_int(rid, ..self.replies.len()) {
                        Some(rid) => {
                            let r = &self.replies[rid];
                            (
                                format!("/api/comments/{}/reply/{}", r.app_comment.0, r.app.0),
                                r.mock_comment,
                                r.mock,
                            )
                        }
                        None => (
                            format!(
                                "/api/comments/{}/reply/{}",
                                CommentId::stub().0,
                                ReplyId::stub().0
                            ),
                            CommentId::stub(),
                            ReplyId::stub(),
                        ),
                    };
                let app_res: Result<Ack, ApiError> = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &app_uri,
                    Some(app_tok.0),
                    &(),
                )
                .await;
                let mock_res = self.mock.delete_reply(mock_tok, mock_comment, mock_reply);
                compare("DeleteReply", app_res.map_err(kind), mock_res.map_err(kind));
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..20usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
