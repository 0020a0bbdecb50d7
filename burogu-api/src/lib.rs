use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
mod comment;
mod error;
mod post;

pub use auth::{AuthToken, NewSession, NewUser, SignUp, VerifyEmail};
pub use comment::{
    Comment, CommentId, EditComment, LikeComment, NewComment, NewReply, Reply, ReplyId,
};
pub use error::Error;
pub use post::{validate_new_post, DeletePost, EditPost, Post, PostId};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// Reject strings that postgres cannot store as TEXT
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

/// Required-field check: the original system treats empty as missing
pub fn validate_required(field: &'static str, s: &str) -> Result<(), Error> {
    validate_string(s)?;
    match s.is_empty() {
        true => Err(Error::MissingField(String::from(field))),
        false => Ok(()),
    }
}

/// Structural email check, local@domain with a dotted domain
pub fn validate_email(s: &str) -> Result<(), Error> {
    validate_required("email", s)?;
    let mut parts = s.split('@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if parts.next().is_some() || local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(Error::InvalidEmail(String::from(s)));
    }
    Ok(())
}

/// Envelope message strings, shared so the server and its in-memory twin
/// answer byte-identically
pub mod messages {
    pub const SIGNED_UP: &str = "Email sent successfully. Verify your email for login.";
    pub const SIGNED_IN: &str = "Logged in successfully";
    pub const SIGNED_OUT: &str = "Logged out successfully";
    pub const EMAIL_VERIFIED: &str = "Email verified successfully";
    pub const USER_CREATED: &str = "User created successfully";
    pub const POST_CREATED: &str = "Post added successfully";
    pub const POSTS_FETCHED: &str = "Posts fetched successfully";
    pub const POST_FETCHED: &str = "Post fetched successfully";
    pub const POST_UPDATED: &str = "Post updated successfully";
    pub const POST_DELETED: &str = "Post deleted successfully";
    pub const COMMENT_CREATED: &str = "Comment created successfully";
    pub const COMMENTS_FETCHED: &str = "Comments fetched successfully";
    pub const COMMENT_UPDATED: &str = "Comment updated successfully";
    pub const COMMENT_DELETED: &str = "Comment deleted successfully";
    pub const COMMENT_LIKED: &str = "Comment liked";
    pub const COMMENT_UNLIKED: &str = "Comment unliked";
    pub const REPLY_CREATED: &str = "Reply added successfully";
    pub const REPLY_DELETED: &str = "Reply deleted successfully";
}

// Response envelopes: every response carries a message, successes also carry
// the affected entity or list under a named field.

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    pub fn new(message: &str) -> Ack {
        Ack {
            message: String::from(message),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionInfo {
    pub message: String,
    pub user: User,
    pub access_token: AuthToken,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostInfo {
    pub message: String,
    pub post: Post,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostList {
    pub message: String,
    pub posts: Vec<Post>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentInfo {
    pub message: String,
    pub comment: Comment,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentList {
    pub message: String,
    pub comments: Vec<Comment>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReplyInfo {
    pub message: String,
    pub reply: Reply,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeOutcome {
    pub message: String,
    pub liked: bool,
    pub likes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields() {
        assert_eq!(validate_required("content", "hi"), Ok(()));
        assert_eq!(
            validate_required("content", ""),
            Err(Error::MissingField(String::from("content"))),
        );
        assert_eq!(
            validate_required("content", "a\0b"),
            Err(Error::NullByteInString(String::from("a\0b"))),
        );
    }

    #[test]
    fn email_shapes() {
        assert_eq!(validate_email("alice@example.com"), Ok(()));
        for bad in ["", "alice", "alice@", "@example.com", "a@b@c.com", "alice@localhost"] {
            assert!(validate_email(bad).is_err(), "accepted {bad:?}");
        }
    }
}
