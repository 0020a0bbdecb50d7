use std::collections::HashMap;

use anyhow::Context;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use burogu_api::{
    messages, validate_new_post, Ack, CommentId, CommentInfo, CommentList, DeletePost,
    EditComment, EditPost, Error as ApiError, LikeComment, LikeOutcome, NewComment, NewReply,
    NewSession, NewUser, PostId, PostInfo, PostList, ReplyId, ReplyInfo, SessionInfo, SignUp,
    Uuid, VerifyEmail,
};

use crate::{db, extractors::*, images::ImageStore, mailer::Mailer, Error};

pub async fn signup(
    State(mailer): State<Mailer>,
    mut conn: PgConn,
    Json(data): Json<SignUp>,
) -> Result<(StatusCode, Json<Ack>), Error> {
    data.validate()?;
    let (user, token) = db::register_user(&mut *conn, &data).await?;
    mailer
        .send_verification(&data.email, token)
        .await
        .with_context(|| format!("sending verification mail for {:?}", user.id))?;
    Ok((StatusCode::CREATED, Json(Ack::new(messages::SIGNED_UP))))
}

pub async fn signin(
    State(mailer): State<Mailer>,
    mut conn: PgConn,
    Json(data): Json<NewSession>,
) -> Result<Json<SessionInfo>, Error> {
    data.validate()?;
    match db::login_user(&mut *conn, &data).await? {
        db::LoginOutcome::Success(user, token) => Ok(Json(SessionInfo {
            message: String::from(messages::SIGNED_IN),
            user,
            access_token: token,
        })),
        db::LoginOutcome::Unverified { user, email } => {
            // A fresh token so the link in the inbox is always a live one
            let token = db::create_verification(&mut *conn, user).await?;
            mailer
                .send_verification(&email, token)
                .await
                .with_context(|| format!("re-sending verification mail for {user:?}"))?;
            Err(ApiError::EmailNotVerified.into())
        }
    }
}

pub async fn logout(user: PreAuth, mut conn: PgConn) -> Result<Json<Ack>, Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(Json(Ack::new(messages::SIGNED_OUT))),
        Ok(false) => Err(Error::permission_denied()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn verify_email(
    mut conn: PgConn,
    Json(data): Json<VerifyEmail>,
) -> Result<Json<Ack>, Error> {
    db::verify_email(&mut *conn, data.token).await?;
    Ok(Json(Ack::new(messages::EMAIL_VERIFIED)))
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(StatusCode, Json<Ack>), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data, true).await?;
    Ok((StatusCode::CREATED, Json(Ack::new(messages::USER_CREATED))))
}

struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<(String, Vec<u8>)>,
}

impl UploadForm {
    fn id_field(&self, name: &'static str) -> Result<Uuid, Error> {
        let raw = self
            .fields
            .get(name)
            .ok_or_else(|| ApiError::MissingField(String::from(name)))?;
        Ok(Uuid::try_parse(raw).map_err(|_| ApiError::InvalidId(raw.clone()))?)
    }
}

async fn read_upload_form(mut form: Multipart) -> Result<UploadForm, Error> {
    let mut fields = HashMap::new();
    let mut file = None;
    while let Some(part) = form.next_field().await.context("reading multipart field")? {
        let name = part.name().unwrap_or_default().to_owned();
        if name == "file" {
            let filename = part.file_name().unwrap_or("upload").to_owned();
            let data = part
                .bytes()
                .await
                .context("reading uploaded file contents")?;
            file = Some((filename, data.to_vec()));
        } else {
            fields.insert(
                name,
                part.text().await.context("reading multipart field text")?,
            );
        }
    }
    Ok(UploadForm { fields, file })
}

pub async fn add_post(
    Auth(user): Auth,
    State(images): State<ImageStore>,
    mut conn: PgConn,
    form: Multipart,
) -> Result<(StatusCode, Json<PostInfo>), Error> {
    let form = read_upload_form(form).await?;
    let (filename, data) = form
        .file
        .ok_or_else(|| ApiError::MissingField(String::from("file")))?;
    let title = form.fields.get("title").cloned().unwrap_or_default();
    let content = form.fields.get("content").cloned().unwrap_or_default();
    validate_new_post(&title, &content)?;
    let image = images
        .upload(&filename, data)
        .await
        .context("uploading front image")?;
    let post = db::create_post(&mut *conn, user, title, content, &image).await?;
    Ok((
        StatusCode::CREATED,
        Json(PostInfo {
            message: String::from(messages::POST_CREATED),
            post,
        }),
    ))
}

pub async fn all_posts(mut conn: PgConn) -> Result<Json<PostList>, Error> {
    Ok(Json(PostList {
        message: String::from(messages::POSTS_FETCHED),
        posts: db::fetch_all_posts(&mut *conn).await?,
    }))
}

pub async fn single_post(
    mut conn: PgConn,
    Path(id): Path<Uuid>,
) -> Result<Json<PostInfo>, Error> {
    let id = PostId(id);
    match db::fetch_post(&mut *conn, id).await? {
        None => Err(Error::post_not_found(id)),
        Some(post) => Ok(Json(PostInfo {
            message: String::from(messages::POST_FETCHED),
            post,
        })),
    }
}

pub async fn user_posts(
    mut conn: PgConn,
    Path(userid): Path<Uuid>,
) -> Result<Json<PostList>, Error> {
    Ok(Json(PostList {
        message: String::from(messages::POSTS_FETCHED),
        posts: db::fetch_posts_by_author(&mut *conn, burogu_api::UserId(userid)).await?,
    }))
}

pub async fn edit_post(
    Auth(user): Auth,
    State(images): State<ImageStore>,
    mut conn: PgConn,
    form: Multipart,
) -> Result<Json<Ack>, Error> {
    let form = read_upload_form(form).await?;
    let data = EditPost {
        post: PostId(form.id_field("post")?),
        title: form.fields.get("title").cloned(),
        content: form.fields.get("content").cloned(),
    };
    data.validate()?;
    if data.is_empty() && form.file.is_none() {
        return Err(ApiError::EmptyEdit.into());
    }
    let old_image = match db::post_author_and_image(&mut *conn, data.post).await? {
        None => return Err(Error::post_not_found(data.post)),
        Some((author, _)) if author != user => return Err(Error::permission_denied()),
        Some((_, image)) => image,
    };
    let image = match form.file {
        None => None,
        Some((filename, bytes)) => {
            images
                .delete(&old_image)
                .await
                .context("deleting replaced front image")?;
            Some(
                images
                    .upload(&filename, bytes)
                    .await
                    .context("uploading front image")?,
            )
        }
    };
    db::update_post(&mut *conn, &data, image.as_ref()).await?;
    Ok(Json(Ack::new(messages::POST_UPDATED)))
}

pub async fn delete_post(
    Auth(user): Auth,
    State(images): State<ImageStore>,
    mut conn: PgConn,
    Json(data): Json<DeletePost>,
) -> Result<Json<Ack>, Error> {
    match db::post_author_and_image(&mut *conn, data.post).await? {
        None => Err(Error::post_not_found(data.post)),
        Some((author, _)) if author != user => Err(Error::permission_denied()),
        Some((_, image)) => {
            images
                .delete(&image)
                .await
                .context("deleting front image")?;
            db::delete_post(&mut *conn, data.post).await?;
            Ok(Json(Ack::new(messages::POST_DELETED)))
        }
    }
}

pub async fn create_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentInfo>), Error> {
    data.validate()?;
    let comment = db::create_comment(&mut *conn, user, &data).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommentInfo {
            message: String::from(messages::COMMENT_CREATED),
            comment,
        }),
    ))
}

pub async fn get_comments(
    mut conn: PgConn,
    Path(post): Path<Uuid>,
) -> Result<Json<CommentList>, Error> {
    Ok(Json(CommentList {
        message: String::from(messages::COMMENTS_FETCHED),
        comments: db::fetch_comments_for_post(&mut *conn, PostId(post)).await?,
    }))
}

pub async fn update_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<EditComment>,
) -> Result<Json<Ack>, Error> {
    data.validate()?;
    db::edit_comment(&mut *conn, user, &data).await?;
    Ok(Json(Ack::new(messages::COMMENT_UPDATED)))
}

pub async fn delete_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<Uuid>,
) -> Result<Json<Ack>, Error> {
    db::delete_comment(&mut *conn, user, CommentId(comment)).await?;
    Ok(Json(Ack::new(messages::COMMENT_DELETED)))
}

pub async fn like_comment(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(data): Json<LikeComment>,
) -> Result<Json<LikeOutcome>, Error> {
    let (liked, likes) = db::toggle_comment_like(&mut *conn, user, data.comment).await?;
    Ok(Json(LikeOutcome {
        message: String::from(match liked {
            true => messages::COMMENT_LIKED,
            false => messages::COMMENT_UNLIKED,
        }),
        liked,
        likes,
    }))
}

pub async fn create_reply(
    Auth(user): Auth,
    mut conn: PgConn,
    Path(comment): Path<Uuid>,
    Json(data): Json<NewReply>,
) -> Result<(StatusCode, Json<ReplyInfo>), Error> {
    data.validate()?;
    let reply = db::create_reply(&mut *conn, user, CommentId(comment), &data).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReplyInfo {
            message: String::from(messages::REPLY_CREATED),
            reply,
        }),
    ))
}

pub async fn delete_reply(
    Auth(user): Auth,
    mut conn: PgConn,
    Path((comment, reply)): Path<(Uuid, Uuid)>,
) -> Result<Json<Ack>, Error> {
    db::delete_reply(&mut *conn, user, CommentId(comment), ReplyId(reply)).await?;
    Ok(Json(Ack::new(messages::REPLY_DELETED)))
}
