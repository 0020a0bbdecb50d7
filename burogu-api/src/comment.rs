use uuid::Uuid;

use crate::{validate_required, Error, PostId, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct ReplyId(pub Uuid);

impl ReplyId {
    pub fn stub() -> ReplyId {
        ReplyId(STUB_UUID)
    }
}

/// Top-level feedback on a post.
///
/// `author_name` (and the reply name fields) are snapshots of the display
/// name at creation time; they are not reconciled with later profile changes.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post: PostId,
    pub author: UserId,
    pub author_name: String,
    pub content: String,

    /// Set semantics: no duplicates, order meaningless
    pub liked_by: Vec<UserId>,

    /// Insertion order preserved, append-only except for targeted removal
    pub replies: Vec<Reply>,

    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Reply {
    pub id: ReplyId,
    pub author: UserId,
    pub author_name: String,
    pub mentioned_user: Option<UserId>,
    pub mentioned_user_name: Option<String>,
    pub content: String,
    pub created_at: Time,
}

impl Comment {
    pub fn new(
        id: CommentId,
        post: PostId,
        author: UserId,
        author_name: String,
        content: String,
        now: Time,
    ) -> Comment {
        Comment {
            id,
            post,
            author,
            author_name,
            content,
            liked_by: Vec::new(),
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Two-state toggle per (comment, caller) pair. Returns whether the
    /// caller likes the comment after the call.
    pub fn toggle_like(&mut self, user: UserId) -> bool {
        match self.liked_by.iter().position(|u| *u == user) {
            Some(idx) => {
                self.liked_by.swap_remove(idx);
                false
            }
            None => {
                self.liked_by.push(user);
                true
            }
        }
    }

    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }

    pub fn push_reply(&mut self, reply: Reply) {
        self.replies.push(reply);
    }

    /// Removes exactly one reply matched by id, keeping the relative order of
    /// the others.
    pub fn remove_reply(&mut self, reply: ReplyId) -> Option<Reply> {
        let idx = self.replies.iter().position(|r| r.id == reply)?;
        Some(self.replies.remove(idx))
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub content: String,
    pub post: PostId,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("content", &self.content)
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub comment: CommentId,
    pub content: String,
}

impl EditComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("content", &self.content)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LikeComment {
    pub comment: CommentId,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewReply {
    pub content: String,
    pub mentioned_user: Option<UserId>,
}

impl NewReply {
    pub fn validate(&self) -> Result<(), Error> {
        validate_required("content", &self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn comment() -> Comment {
        Comment::new(
            CommentId(Uuid::new_v4()),
            PostId::stub(),
            UserId::stub(),
            String::from("alice"),
            String::from("Nice post"),
            Utc::now(),
        )
    }

    fn reply(c: &mut Comment, content: &str) -> ReplyId {
        let id = ReplyId(Uuid::new_v4());
        c.push_reply(Reply {
            id,
            author: UserId(Uuid::new_v4()),
            author_name: String::from("bob"),
            mentioned_user: None,
            mentioned_user_name: None,
            content: String::from(content),
            created_at: Utc::now(),
        });
        id
    }

    #[test]
    fn starts_empty() {
        let c = comment();
        assert_eq!(c.liked_by, Vec::new());
        assert_eq!(c.replies, Vec::new());
        assert_eq!(c.author_name, "alice");
    }

    #[test]
    fn toggle_is_an_involution() {
        let mut c = comment();
        let u = UserId(Uuid::new_v4());
        assert!(c.toggle_like(u));
        assert_eq!(c.liked_by, vec![u]);
        assert!(!c.toggle_like(u));
        assert_eq!(c.liked_by, Vec::new());
        // odd number of applications nets exactly one membership flip
        for _ in 0..5 {
            c.toggle_like(u);
        }
        assert_eq!(c.liked_by, vec![u]);
        assert_eq!(c.like_count(), 1);
    }

    #[test]
    fn likes_stay_duplicate_free() {
        let mut c = comment();
        let users: Vec<UserId> = (0..10).map(|_| UserId(Uuid::new_v4())).collect();
        for u in &users {
            c.toggle_like(*u);
        }
        assert_eq!(c.like_count(), users.len());
        for u in &users {
            assert_eq!(c.liked_by.iter().filter(|x| **x == *u).count(), 1);
        }
    }

    #[test]
    fn reply_removal_preserves_order() {
        let mut c = comment();
        let a = reply(&mut c, "A");
        let b = reply(&mut c, "B");
        let d = reply(&mut c, "C");
        assert!(c.remove_reply(b).is_some());
        let left: Vec<ReplyId> = c.replies.iter().map(|r| r.id).collect();
        assert_eq!(left, vec![a, d]);
        assert_eq!(c.remove_reply(b), None);
    }
}
