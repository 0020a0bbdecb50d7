use std::collections::HashMap;

use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use sqlx::Row;
use uuid::Uuid;

use burogu_api::{
    AuthToken, Comment, CommentId, EditComment, EditPost, NewComment, NewReply, NewSession,
    NewUser, Post, PostId, Reply, ReplyId, SignUp, User, UserId,
};

use crate::{images::StoredImage, Error};

#[cfg(not(test))]
const BCRYPT_COST: u32 = 10;
// keep the fuzz loops fast
#[cfg(test)]
const BCRYPT_COST: u32 = 4;
const VERIFICATION_VALIDITY_HOURS: i64 = 1;

fn user_from_row(r: &sqlx::postgres::PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: UserId(r.try_get("id").context("retrieving the id field")?),
        name: r.try_get("name").context("retrieving the name field")?,
    })
}

fn post_from_row(r: &sqlx::postgres::PgRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: PostId(r.try_get("id").context("retrieving the id field")?),
        author: UserId(
            r.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        title: r.try_get("title").context("retrieving the title field")?,
        content: r
            .try_get("content")
            .context("retrieving the content field")?,
        front_image: r
            .try_get("front_image_url")
            .context("retrieving the front_image_url field")?,
        created_at: r
            .try_get("created_at")
            .context("retrieving the created_at field")?,
        updated_at: r
            .try_get("updated_at")
            .context("retrieving the updated_at field")?,
    })
}

pub async fn create_user(
    conn: &mut sqlx::PgConnection,
    data: NewUser,
    verified: bool,
) -> Result<User, Error> {
    // name is checked before email so conflict reports are deterministic
    if sqlx::query("SELECT id FROM users WHERE name = $1")
        .bind(&data.name)
        .fetch_optional(&mut *conn)
        .await
        .context("querying users table for name conflicts")?
        .is_some()
    {
        return Err(burogu_api::Error::NameAlreadyUsed(data.name).into());
    }
    if sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(&data.email)
        .fetch_optional(&mut *conn)
        .await
        .context("querying users table for email conflicts")?
        .is_some()
    {
        return Err(burogu_api::Error::EmailAlreadyUsed(data.email).into());
    }

    let hash = bcrypt::hash(&data.password, BCRYPT_COST).context("hashing password")?;
    let res = sqlx::query(
        "
            INSERT INTO users (id, name, email, password_hash, is_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(data.id.0)
    .bind(&data.name)
    .bind(&data.email)
    .bind(hash)
    .bind(verified)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting user {:?}", data.id))?;
    if res.rows_affected() != 1 {
        return Err(anyhow!(
            "insertion of user {:?} affected {} rows",
            data.id,
            res.rows_affected()
        )
        .into());
    }
    Ok(User {
        id: data.id,
        name: data.name,
    })
}

pub async fn register_user(
    conn: &mut sqlx::PgConnection,
    data: &SignUp,
) -> Result<(User, Uuid), Error> {
    let user = create_user(
        &mut *conn,
        NewUser::new(
            UserId(Uuid::new_v4()),
            data.username.clone(),
            data.email.clone(),
            data.password.clone(),
        ),
        false,
    )
    .await?;
    let token = create_verification(&mut *conn, user.id).await?;
    Ok((user, token))
}

pub async fn create_verification(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> Result<Uuid, Error> {
    let token = Uuid::new_v4();
    sqlx::query("INSERT INTO email_verifications (token, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(token)
        .bind(user.0)
        .bind(Utc::now() + Duration::hours(VERIFICATION_VALIDITY_HOURS))
        .execute(conn)
        .await
        .with_context(|| format!("inserting email verification for {user:?}"))?;
    Ok(token)
}

pub async fn verify_email(conn: &mut sqlx::PgConnection, token: Uuid) -> Result<(), Error> {
    let row = sqlx::query(
        "SELECT user_id FROM email_verifications WHERE token = $1 AND expires_at > $2",
    )
    .bind(token)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await
    .context("querying email verifications")?;
    let user: Uuid = match row {
        None => return Err(burogu_api::Error::InvalidToken.into()),
        Some(row) => row
            .try_get("user_id")
            .context("retrieving the user_id field")?,
    };
    sqlx::query("UPDATE users SET is_verified = true WHERE id = $1")
        .bind(user)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("marking user {user:?} verified"))?;
    sqlx::query("DELETE FROM email_verifications WHERE user_id = $1")
        .bind(user)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("dropping consumed verifications for {user:?}"))?;
    Ok(())
}

pub enum LoginOutcome {
    Success(User, AuthToken),
    Unverified { user: UserId, email: String },
}

pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    data: &NewSession,
) -> Result<LoginOutcome, Error> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, is_verified FROM users WHERE name = $1",
    )
    .bind(&data.user)
    .fetch_optional(&mut *conn)
    .await
    .context("querying users table")?;
    let row = row.ok_or_else(Error::invalid_credentials)?;
    let hash: String = row
        .try_get("password_hash")
        .context("retrieving the password_hash field")?;
    if !bcrypt::verify(&data.password, &hash).context("verifying password")? {
        return Err(Error::invalid_credentials());
    }
    let user = user_from_row(&row)?;
    let verified: bool = row
        .try_get("is_verified")
        .context("retrieving the is_verified field")?;
    if !verified {
        return Ok(LoginOutcome::Unverified {
            user: user.id,
            email: row.try_get("email").context("retrieving the email field")?,
        });
    }
    let token = AuthToken(Uuid::new_v4());
    sqlx::query("INSERT INTO sessions (token, user_id, device, login_time) VALUES ($1, $2, $3, $4)")
        .bind(token.0)
        .bind(user.id.0)
        .bind(&data.device)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting session for {:?}", user.id))?;
    Ok(LoginOutcome::Success(user, token))
}

pub async fn logout_user(conn: &mut sqlx::PgConnection, token: &AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() > 0)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let row = sqlx::query("SELECT user_id FROM sessions WHERE token = $1")
        .bind(token.0)
        .fetch_optional(conn)
        .await
        .context("querying sessions table")?;
    match row {
        None => Err(Error::permission_denied()),
        Some(row) => Ok(UserId(
            row.try_get("user_id")
                .context("retrieving the user_id field")?,
        )),
    }
}

pub async fn resolve_display_name(
    conn: &mut sqlx::PgConnection,
    user: UserId,
) -> Result<String, Error> {
    let row = sqlx::query("SELECT name FROM users WHERE id = $1")
        .bind(user.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("resolving display name of {user:?}"))?;
    match row {
        None => Err(Error::user_not_found(user)),
        Some(row) => Ok(row.try_get("name").context("retrieving the name field")?),
    }
}

pub async fn post_exists(conn: &mut sqlx::PgConnection, post: PostId) -> anyhow::Result<bool> {
    Ok(sqlx::query("SELECT id FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("checking existence of post {post:?}"))?
        .is_some())
}

pub async fn create_post(
    conn: &mut sqlx::PgConnection,
    author: UserId,
    title: String,
    content: String,
    image: &StoredImage,
) -> Result<Post, Error> {
    let now = Utc::now();
    let post = Post {
        id: PostId(Uuid::new_v4()),
        author,
        title,
        content,
        front_image: image.url.clone(),
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        "
            INSERT INTO posts
                (id, author_id, title, content, front_image_url, front_image_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(post.id.0)
    .bind(post.author.0)
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.front_image)
    .bind(&image.public_id)
    .bind(post.created_at)
    .bind(post.updated_at)
    .execute(conn)
    .await
    .with_context(|| format!("inserting post {:?}", post.id))?;
    Ok(post)
}

pub async fn fetch_all_posts(conn: &mut sqlx::PgConnection) -> Result<Vec<Post>, Error> {
    let rows = sqlx::query("SELECT * FROM posts ORDER BY created_at, id")
        .fetch_all(conn)
        .await
        .context("querying posts table")?;
    Ok(rows
        .iter()
        .map(post_from_row)
        .collect::<anyhow::Result<Vec<Post>>>()?)
}

pub async fn fetch_post(
    conn: &mut sqlx::PgConnection,
    post: PostId,
) -> Result<Option<Post>, Error> {
    let row = sqlx::query("SELECT * FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("querying post {post:?}"))?;
    Ok(match row {
        None => None,
        Some(row) => Some(post_from_row(&row)?),
    })
}

pub async fn fetch_posts_by_author(
    conn: &mut sqlx::PgConnection,
    author: UserId,
) -> Result<Vec<Post>, Error> {
    let rows = sqlx::query("SELECT * FROM posts WHERE author_id = $1 ORDER BY created_at, id")
        .bind(author.0)
        .fetch_all(conn)
        .await
        .with_context(|| format!("querying posts of {author:?}"))?;
    Ok(rows
        .iter()
        .map(post_from_row)
        .collect::<anyhow::Result<Vec<Post>>>()?)
}

/// Author and image blob id, for authorization checks and blob cleanup
pub async fn post_author_and_image(
    conn: &mut sqlx::PgConnection,
    post: PostId,
) -> Result<Option<(UserId, String)>, Error> {
    let row = sqlx::query("SELECT author_id, front_image_id FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("querying post {post:?}"))?;
    Ok(match row {
        None => None,
        Some(row) => Some((
            UserId(
                row.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ),
            row.try_get("front_image_id")
                .context("retrieving the front_image_id field")?,
        )),
    })
}

pub async fn update_post(
    conn: &mut sqlx::PgConnection,
    data: &EditPost,
    image: Option<&StoredImage>,
) -> Result<(), Error> {
    let res = sqlx::query(
        "
            UPDATE posts SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                front_image_url = COALESCE($4, front_image_url),
                front_image_id = COALESCE($5, front_image_id),
                updated_at = $6
            WHERE id = $1
        ",
    )
    .bind(data.post.0)
    .bind(&data.title)
    .bind(&data.content)
    .bind(image.map(|i| &i.url))
    .bind(image.map(|i| &i.public_id))
    .bind(Utc::now())
    .execute(conn)
    .await
    .with_context(|| format!("updating post {:?}", data.post))?;
    match res.rows_affected() {
        0 => Err(Error::post_not_found(data.post)),
        _ => Ok(()),
    }
}

pub async fn delete_post(conn: &mut sqlx::PgConnection, post: PostId) -> Result<(), Error> {
    let res = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting post {post:?}"))?;
    match res.rows_affected() {
        0 => Err(Error::post_not_found(post)),
        _ => Ok(()),
    }
}

pub async fn create_comment(
    conn: &mut sqlx::PgConnection,
    author: UserId,
    data: &NewComment,
) -> Result<Comment, Error> {
    let author_name = resolve_display_name(&mut *conn, author).await?;
    if !post_exists(&mut *conn, data.post).await? {
        return Err(Error::post_not_found(data.post));
    }
    let comment = Comment::new(
        CommentId(Uuid::new_v4()),
        data.post,
        author,
        author_name,
        data.content.clone(),
        Utc::now(),
    );
    sqlx::query(
        "
            INSERT INTO comments
                (id, post_id, author_id, author_name, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ",
    )
    .bind(comment.id.0)
    .bind(comment.post.0)
    .bind(comment.author.0)
    .bind(&comment.author_name)
    .bind(&comment.content)
    .bind(comment.created_at)
    .bind(comment.updated_at)
    .execute(conn)
    .await
    .with_context(|| format!("inserting comment {:?}", comment.id))?;
    Ok(comment)
}

/// Comments of a post in ascending creation order, with their likes and
/// replies attached
pub async fn fetch_comments_for_post(
    conn: &mut sqlx::PgConnection,
    post: PostId,
) -> Result<Vec<Comment>, Error> {
    let mut comments = Vec::new();
    let mut index = HashMap::new();

    let rows = sqlx::query(
        "
            SELECT id, post_id, author_id, author_name, content, created_at, updated_at
                FROM comments
            WHERE post_id = $1
            ORDER BY created_at, id
        ",
    )
    .bind(post.0)
    .fetch_all(&mut *conn)
    .await
    .context("querying comments table")?;
    for r in rows {
        let id: Uuid = r.try_get("id").context("retrieving the id field")?;
        index.insert(id, comments.len());
        comments.push(Comment {
            id: CommentId(id),
            post: PostId(
                r.try_get("post_id")
                    .context("retrieving the post_id field")?,
            ),
            author: UserId(
                r.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ),
            author_name: r
                .try_get("author_name")
                .context("retrieving the author_name field")?,
            content: r
                .try_get("content")
                .context("retrieving the content field")?,
            liked_by: Vec::new(),
            replies: Vec::new(),
            created_at: r
                .try_get("created_at")
                .context("retrieving the created_at field")?,
            updated_at: r
                .try_get("updated_at")
                .context("retrieving the updated_at field")?,
        });
    }

    let rows = sqlx::query(
        "
            SELECT l.comment_id, l.user_id
                FROM comment_likes l
            INNER JOIN comments c
                ON c.id = l.comment_id
            WHERE c.post_id = $1
        ",
    )
    .bind(post.0)
    .fetch_all(&mut *conn)
    .await
    .context("querying comment_likes table")?;
    for r in rows {
        let comment: Uuid = r
            .try_get("comment_id")
            .context("retrieving the comment_id field")?;
        if let Some(idx) = index.get(&comment) {
            comments[*idx].liked_by.push(UserId(
                r.try_get("user_id")
                    .context("retrieving the user_id field")?,
            ));
        }
    }

    let rows = sqlx::query(
        "
            SELECT r.id, r.comment_id, r.author_id, r.author_name,
                   r.mentioned_user_id, r.mentioned_user_name, r.content, r.created_at
                FROM comment_replies r
            INNER JOIN comments c
                ON c.id = r.comment_id
            WHERE c.post_id = $1
            ORDER BY r.seq
        ",
    )
    .bind(post.0)
    .fetch_all(&mut *conn)
    .await
    .context("querying comment_replies table")?;
    for r in rows {
        let comment: Uuid = r
            .try_get("comment_id")
            .context("retrieving the comment_id field")?;
        if let Some(idx) = index.get(&comment) {
            comments[*idx].replies.push(Reply {
                id: ReplyId(r.try_get("id").context("retrieving the id field")?),
                author: UserId(
                    r.try_get("author_id")
                        .context("retrieving the author_id field")?,
                ),
                author_name: r
                    .try_get("author_name")
                    .context("retrieving the author_name field")?,
                mentioned_user: r
                    .try_get::<Option<Uuid>, _>("mentioned_user_id")
                    .context("retrieving the mentioned_user_id field")?
                    .map(UserId),
                mentioned_user_name: r
                    .try_get("mentioned_user_name")
                    .context("retrieving the mentioned_user_name field")?,
                content: r
                    .try_get("content")
                    .context("retrieving the content field")?,
                created_at: r
                    .try_get("created_at")
                    .context("retrieving the created_at field")?,
            });
        }
    }

    Ok(comments)
}

async fn comment_author(
    conn: &mut sqlx::PgConnection,
    comment: CommentId,
) -> Result<Option<UserId>, Error> {
    let row = sqlx::query("SELECT author_id FROM comments WHERE id = $1")
        .bind(comment.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("querying comment {comment:?}"))?;
    Ok(match row {
        None => None,
        Some(row) => Some(UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        )),
    })
}

/// Existence check doubling as the updated_at bump every aggregate mutation
/// performs
async fn touch_comment(conn: &mut sqlx::PgConnection, comment: CommentId) -> Result<(), Error> {
    let res = sqlx::query("UPDATE comments SET updated_at = $2 WHERE id = $1")
        .bind(comment.0)
        .bind(Utc::now())
        .execute(conn)
        .await
        .with_context(|| format!("touching comment {comment:?}"))?;
    match res.rows_affected() {
        0 => Err(Error::comment_not_found(comment)),
        _ => Ok(()),
    }
}

pub async fn edit_comment(
    conn: &mut sqlx::PgConnection,
    caller: UserId,
    data: &EditComment,
) -> Result<(), Error> {
    match comment_author(&mut *conn, data.comment).await? {
        None => return Err(Error::comment_not_found(data.comment)),
        Some(author) if author != caller => return Err(Error::permission_denied()),
        Some(_) => (),
    }
    sqlx::query("UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1")
        .bind(data.comment.0)
        .bind(&data.content)
        .bind(Utc::now())
        .execute(conn)
        .await
        .with_context(|| format!("updating comment {:?}", data.comment))?;
    Ok(())
}

pub async fn delete_comment(
    conn: &mut sqlx::PgConnection,
    caller: UserId,
    comment: CommentId,
) -> Result<(), Error> {
    match comment_author(&mut *conn, comment).await? {
        None => return Err(Error::comment_not_found(comment)),
        Some(author) if author != caller => return Err(Error::permission_denied()),
        Some(_) => (),
    }
    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting comment {comment:?}"))?;
    Ok(())
}

/// Two-state toggle per (comment, caller). The membership flip is a single
/// statement each way, so concurrent toggles by distinct callers cannot lose
/// updates.
pub async fn toggle_comment_like(
    conn: &mut sqlx::PgConnection,
    caller: UserId,
    comment: CommentId,
) -> Result<(bool, usize), Error> {
    touch_comment(&mut *conn, comment).await?;
    let deleted = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment.0)
        .bind(caller.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("removing like of {caller:?} on {comment:?}"))?
        .rows_affected();
    let liked = deleted == 0;
    if liked {
        sqlx::query(
            "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(comment.0)
        .bind(caller.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("adding like of {caller:?} on {comment:?}"))?;
    }
    let likes: i64 = sqlx::query("SELECT COUNT(*) AS likes FROM comment_likes WHERE comment_id = $1")
        .bind(comment.0)
        .fetch_one(conn)
        .await
        .with_context(|| format!("counting likes on {comment:?}"))?
        .try_get("likes")
        .context("retrieving the likes field")?;
    Ok((liked, likes as usize))
}

pub async fn create_reply(
    conn: &mut sqlx::PgConnection,
    author: UserId,
    comment: CommentId,
    data: &NewReply,
) -> Result<Reply, Error> {
    let author_name = resolve_display_name(&mut *conn, author).await?;
    let mentioned_user_name = match data.mentioned_user {
        None => None,
        Some(mentioned) => Some(resolve_display_name(&mut *conn, mentioned).await?),
    };
    touch_comment(&mut *conn, comment).await?;
    let reply = Reply {
        id: ReplyId(Uuid::new_v4()),
        author,
        author_name,
        mentioned_user: data.mentioned_user,
        mentioned_user_name,
        content: data.content.clone(),
        created_at: Utc::now(),
    };
    sqlx::query(
        "
            INSERT INTO comment_replies
                (id, comment_id, author_id, author_name,
                 mentioned_user_id, mentioned_user_name, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(reply.id.0)
    .bind(comment.0)
    .bind(reply.author.0)
    .bind(&reply.author_name)
    .bind(reply.mentioned_user.map(|u| u.0))
    .bind(&reply.mentioned_user_name)
    .bind(&reply.content)
    .bind(reply.created_at)
    .execute(conn)
    .await
    .with_context(|| format!("inserting reply {:?}", reply.id))?;
    Ok(reply)
}

pub async fn delete_reply(
    conn: &mut sqlx::PgConnection,
    caller: UserId,
    comment: CommentId,
    reply: ReplyId,
) -> Result<(), Error> {
    touch_comment(&mut *conn, comment).await?;
    let row = sqlx::query("SELECT author_id FROM comment_replies WHERE id = $1 AND comment_id = $2")
        .bind(reply.0)
        .bind(comment.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("querying reply {reply:?}"))?;
    let author: Uuid = match row {
        None => return Err(Error::reply_not_found(reply)),
        Some(row) => row
            .try_get("author_id")
            .context("retrieving the author_id field")?,
    };
    if UserId(author) != caller {
        return Err(Error::permission_denied());
    }
    sqlx::query("DELETE FROM comment_replies WHERE id = $1")
        .bind(reply.0)
        .execute(conn)
        .await
        .with_context(|| format!("deleting reply {reply:?}"))?;
    Ok(())
}
