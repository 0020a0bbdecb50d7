use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{CommentId, PostId, ReplyId, UserId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Missing required field {0}")]
    MissingField(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid email address {0:?}")]
    InvalidEmail(String),

    #[error("Malformed identifier {0:?}")]
    InvalidId(String),

    #[error("Edit request carries no change")]
    EmptyEdit,

    #[error("Invalid or expired verification token")]
    InvalidToken,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Email address is not verified yet")]
    EmailNotVerified,

    #[error("Invalid user credentials")]
    InvalidCredentials,

    #[error("Username already used {0}")]
    NameAlreadyUsed(String),

    #[error("Email already used {0}")]
    EmailAlreadyUsed(String),

    #[error("User not found {0:?}")]
    UserNotFound(UserId),

    #[error("Post not found {0:?}")]
    PostNotFound(PostId),

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Reply not found {0:?}")]
    ReplyNotFound(ReplyId),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::MissingField(_) => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidEmail(_) => StatusCode::BAD_REQUEST,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            Error::EmptyEdit => StatusCode::BAD_REQUEST,
            Error::InvalidToken => StatusCode::BAD_REQUEST,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::EmailNotVerified => StatusCode::FORBIDDEN,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::EmailAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::UserNotFound(_) => StatusCode::NOT_FOUND,
            Error::PostNotFound(_) => StatusCode::NOT_FOUND,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::ReplyNotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::MissingField(field) => json!({
                "message": format!("{field} is required"),
                "type": "missing-field",
                "field": field,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidEmail(email) => json!({
                "message": "invalid email format",
                "type": "invalid-email",
                "email": email,
            }),
            Error::InvalidId(id) => json!({
                "message": "malformed identifier",
                "type": "invalid-id",
                "id": id,
            }),
            Error::EmptyEdit => json!({
                "message": "no changes detected",
                "type": "empty-edit",
            }),
            Error::InvalidToken => json!({
                "message": "invalid or expired verification token",
                "type": "invalid-token",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::EmailNotVerified => json!({
                "message": "email is not verified",
                "type": "email-not-verified",
            }),
            Error::InvalidCredentials => json!({
                "message": "invalid user credentials",
                "type": "invalid-credentials",
            }),
            Error::NameAlreadyUsed(name) => json!({
                "message": "username already used",
                "type": "conflict-name",
                "name": name,
            }),
            Error::EmailAlreadyUsed(email) => json!({
                "message": "email already used",
                "type": "conflict-email",
                "email": email,
            }),
            Error::UserNotFound(id) => json!({
                "message": "user not found",
                "type": "user-not-found",
                "id": id.0,
            }),
            Error::PostNotFound(id) => json!({
                "message": "post not found",
                "type": "post-not-found",
                "id": id.0,
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id.0,
            }),
            Error::ReplyNotFound(id) => json!({
                "message": "reply not found",
                "type": "reply-not-found",
                "id": id.0,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| -> anyhow::Result<String> {
            Ok(String::from(data.get(name).and_then(|f| f.as_str()).ok_or_else(
                || anyhow!("error contents has no string field {name:?}"),
            )?))
        };
        let id = || -> anyhow::Result<Uuid> {
            Uuid::from_str(&field("id")?).context("error contents has a malformed id")
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(field("message").unwrap_or_default()),
                "missing-field" => Error::MissingField(field("field")?),
                "null-byte" => Error::NullByteInString(field("string")?),
                "invalid-email" => Error::InvalidEmail(field("email")?),
                "invalid-id" => Error::InvalidId(field("id")?),
                "empty-edit" => Error::EmptyEdit,
                "invalid-token" => Error::InvalidToken,
                "permission-denied" => Error::PermissionDenied,
                "email-not-verified" => Error::EmailNotVerified,
                "invalid-credentials" => Error::InvalidCredentials,
                "conflict-name" => Error::NameAlreadyUsed(field("name")?),
                "conflict-email" => Error::EmailAlreadyUsed(field("email")?),
                "user-not-found" => Error::UserNotFound(UserId(id()?)),
                "post-not-found" => Error::PostNotFound(PostId(id()?)),
                "comment-not-found" => Error::CommentNotFound(CommentId(id()?)),
                "reply-not-found" => Error::ReplyNotFound(ReplyId(id()?)),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_round_trip_through_json() {
        let all = vec![
            Error::Unknown(String::from("boom")),
            Error::MissingField(String::from("content")),
            Error::NullByteInString(String::from("a\0b")),
            Error::InvalidEmail(String::from("not-an-email")),
            Error::InvalidId(String::from("not-a-uuid")),
            Error::EmptyEdit,
            Error::InvalidToken,
            Error::PermissionDenied,
            Error::EmailNotVerified,
            Error::InvalidCredentials,
            Error::NameAlreadyUsed(String::from("alice")),
            Error::EmailAlreadyUsed(String::from("alice@example.com")),
            Error::UserNotFound(UserId::stub()),
            Error::PostNotFound(PostId::stub()),
            Error::CommentNotFound(CommentId::stub()),
            Error::ReplyNotFound(ReplyId::stub()),
        ];
        for err in all {
            let parsed = Error::parse(&err.contents()).expect("parsing serialized error");
            assert_eq!(parsed, err);
        }
    }
}
