use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, Utc};
use uuid::Uuid;

use burogu_api::{
    messages, Ack, AuthToken, Comment, CommentId, CommentInfo, CommentList, DeletePost,
    EditComment, EditPost, Error, LikeComment, LikeOutcome, NewComment, NewReply, NewSession,
    NewUser, Post, PostId, PostInfo, PostList, Reply, ReplyId, ReplyInfo, SessionInfo, SignUp,
    Time, User, UserId,
};

const VERIFICATION_VALIDITY_HOURS: i64 = 1;

/// In-memory twin of the burogu server: same surface, same error kinds, same
/// envelope messages. Backs the property tests and the comparative fuzzer.
pub struct MockServer {
    users: BTreeMap<UserId, MockUser>,
    sessions: HashMap<AuthToken, UserId>,
    verifications: HashMap<Uuid, (UserId, Time)>,
    posts: Vec<Post>,
    comments: Vec<Comment>,
}

#[derive(Debug)]
struct MockUser {
    name: String,
    email: String,
    // tests don't run bcrypt, passwords are kept in the clear
    pass: String,
    verified: bool,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            verifications: HashMap::new(),
            posts: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Return name & pass for user number `id`
    pub fn test_get_user_info(&self, id: usize) -> (&str, &str) {
        let u = self
            .users
            .values()
            .skip(id)
            .next()
            .unwrap_or_else(|| panic!("getting user {id} among {}", self.users.len()));
        (&u.name, &u.pass)
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    /// Return a live verification token for the named user, if any
    pub fn test_verification_token(&self, name: &str) -> Option<Uuid> {
        let uid = self.user_by_name(name)?;
        self.verifications
            .iter()
            .find(|(_, (user, _))| *user == uid)
            .map(|(token, _)| *token)
    }

    fn user_by_name(&self, name: &str) -> Option<UserId> {
        self.users
            .iter()
            .find(|(_, u)| u.name == name)
            .map(|(id, _)| *id)
    }

    fn check_conflicts(&self, name: &str, email: &str) -> Result<(), Error> {
        if self.users.values().any(|u| u.name == name) {
            return Err(Error::NameAlreadyUsed(String::from(name)));
        }
        if self.users.values().any(|u| u.email == email) {
            return Err(Error::EmailAlreadyUsed(String::from(email)));
        }
        Ok(())
    }

    fn resolve(&self, tok: AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(&tok)
            .copied()
            .ok_or(Error::PermissionDenied)
    }

    fn display_name(&self, user: UserId) -> Result<String, Error> {
        self.users
            .get(&user)
            .map(|u| u.name.clone())
            .ok_or(Error::UserNotFound(user))
    }

    fn comment_mut(&mut self, comment: CommentId) -> Result<&mut Comment, Error> {
        self.comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or(Error::CommentNotFound(comment))
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<Ack, Error> {
        u.validate()?;
        self.check_conflicts(&u.name, &u.email)?;
        self.users.insert(
            u.id,
            MockUser {
                name: u.name,
                email: u.email,
                pass: u.password,
                verified: true,
            },
        );
        Ok(Ack::new(messages::USER_CREATED))
    }

    pub fn signup(&mut self, s: SignUp) -> Result<Ack, Error> {
        s.validate()?;
        self.check_conflicts(&s.username, &s.email)?;
        let id = UserId(Uuid::new_v4());
        self.users.insert(
            id,
            MockUser {
                name: s.username,
                email: s.email,
                pass: s.password,
                verified: false,
            },
        );
        self.create_verification(id);
        Ok(Ack::new(messages::SIGNED_UP))
    }

    fn create_verification(&mut self, user: UserId) -> Uuid {
        let token = Uuid::new_v4();
        self.verifications.insert(
            token,
            (user, Utc::now() + Duration::hours(VERIFICATION_VALIDITY_HOURS)),
        );
        token
    }

    pub fn signin(&mut self, s: NewSession) -> Result<SessionInfo, Error> {
        s.validate()?;
        let uid = self
            .user_by_name(&s.user)
            .ok_or(Error::InvalidCredentials)?;
        let (pass, verified, name) = {
            let user = &self.users[&uid];
            (user.pass.clone(), user.verified, user.name.clone())
        };
        if pass != s.password {
            return Err(Error::InvalidCredentials);
        }
        if !verified {
            self.create_verification(uid);
            return Err(Error::EmailNotVerified);
        }
        let token = AuthToken(Uuid::new_v4());
        self.sessions.insert(token, uid);
        Ok(SessionInfo {
            message: String::from(messages::SIGNED_IN),
            user: User { id: uid, name },
            access_token: token,
        })
    }

    pub fn logout(&mut self, tok: AuthToken) -> Result<Ack, Error> {
        match self.sessions.remove(&tok) {
            Some(_) => Ok(Ack::new(messages::SIGNED_OUT)),
            None => Err(Error::PermissionDenied),
        }
    }

    pub fn verify_email(&mut self, token: Uuid) -> Result<Ack, Error> {
        let user = match self.verifications.get(&token) {
            Some((user, expiry)) if *expiry > Utc::now() => *user,
            _ => return Err(Error::InvalidToken),
        };
        if let Some(u) = self.users.get_mut(&user) {
            u.verified = true;
        }
        self.verifications.retain(|_, (u, _)| *u != user);
        Ok(Ack::new(messages::EMAIL_VERIFIED))
    }

    pub fn add_post(
        &mut self,
        tok: AuthToken,
        title: String,
        content: String,
        filename: &str,
    ) -> Result<PostInfo, Error> {
        let caller = self.resolve(tok)?;
        burogu_api::validate_new_post(&title, &content)?;
        let now = Utc::now();
        let post = Post {
            id: PostId(Uuid::new_v4()),
            author: caller,
            title,
            content,
            front_image: format!("https://images.invalid/blogs/{}/{}", Uuid::new_v4(), filename),
            created_at: now,
            updated_at: now,
        };
        self.posts.push(post.clone());
        Ok(PostInfo {
            message: String::from(messages::POST_CREATED),
            post,
        })
    }

    pub fn all_posts(&self) -> Result<PostList, Error> {
        Ok(PostList {
            message: String::from(messages::POSTS_FETCHED),
            posts: self.posts.clone(),
        })
    }

    pub fn single_post(&self, post: PostId) -> Result<PostInfo, Error> {
        match self.posts.iter().find(|p| p.id == post) {
            None => Err(Error::PostNotFound(post)),
            Some(p) => Ok(PostInfo {
                message: String::from(messages::POST_FETCHED),
                post: p.clone(),
            }),
        }
    }

    pub fn user_posts(&self, author: UserId) -> Result<PostList, Error> {
        Ok(PostList {
            message: String::from(messages::POSTS_FETCHED),
            posts: self
                .posts
                .iter()
                .filter(|p| p.author == author)
                .cloned()
                .collect(),
        })
    }

    pub fn edit_post(
        &mut self,
        tok: AuthToken,
        data: EditPost,
        new_file: Option<&str>,
    ) -> Result<Ack, Error> {
        let caller = self.resolve(tok)?;
        data.validate()?;
        if data.is_empty() && new_file.is_none() {
            return Err(Error::EmptyEdit);
        }
        let post = self
            .posts
            .iter_mut()
            .find(|p| p.id == data.post)
            .ok_or(Error::PostNotFound(data.post))?;
        if post.author != caller {
            return Err(Error::PermissionDenied);
        }
        if let Some(title) = data.title {
            post.title = title;
        }
        if let Some(content) = data.content {
            post.content = content;
        }
        if let Some(filename) = new_file {
            post.front_image =
                format!("https://images.invalid/blogs/{}/{}", Uuid::new_v4(), filename);
        }
        post.updated_at = Utc::now();
        Ok(Ack::new(messages::POST_UPDATED))
    }

    pub fn delete_post(&mut self, tok: AuthToken, data: DeletePost) -> Result<Ack, Error> {
        let caller = self.resolve(tok)?;
        let idx = self
            .posts
            .iter()
            .position(|p| p.id == data.post)
            .ok_or(Error::PostNotFound(data.post))?;
        if self.posts[idx].author != caller {
            return Err(Error::PermissionDenied);
        }
        self.posts.remove(idx);
        // comments fall with their post
        self.comments.retain(|c| c.post != data.post);
        Ok(Ack::new(messages::POST_DELETED))
    }

    pub fn create_comment(&mut self, tok: AuthToken, data: NewComment) -> Result<CommentInfo, Error> {
        let caller = self.resolve(tok)?;
        data.validate()?;
        let author_name = self.display_name(caller)?;
        if !self.posts.iter().any(|p| p.id == data.post) {
            return Err(Error::PostNotFound(data.post));
        }
        let comment = Comment::new(
            CommentId(Uuid::new_v4()),
            data.post,
            caller,
            author_name,
            data.content,
            Utc::now(),
        );
        self.comments.push(comment.clone());
        Ok(CommentInfo {
            message: String::from(messages::COMMENT_CREATED),
            comment,
        })
    }

    pub fn get_comments(&self, post: PostId) -> Result<CommentList, Error> {
        Ok(CommentList {
            message: String::from(messages::COMMENTS_FETCHED),
            comments: self
                .comments
                .iter()
                .filter(|c| c.post == post)
                .cloned()
                .collect(),
        })
    }

    pub fn update_comment(&mut self, tok: AuthToken, data: EditComment) -> Result<Ack, Error> {
        let caller = self.resolve(tok)?;
        data.validate()?;
        let comment = self.comment_mut(data.comment)?;
        if comment.author != caller {
            return Err(Error::PermissionDenied);
        }
        comment.content = data.content;
        comment.updated_at = Utc::now();
        Ok(Ack::new(messages::COMMENT_UPDATED))
    }

    pub fn delete_comment(&mut self, tok: AuthToken, comment: CommentId) -> Result<Ack, Error> {
        let caller = self.resolve(tok)?;
        let idx = self
            .comments
            .iter()
            .position(|c| c.id == comment)
            .ok_or(Error::CommentNotFound(comment))?;
        if self.comments[idx].author != caller {
            return Err(Error::PermissionDenied);
        }
        self.comments.remove(idx);
        Ok(Ack::new(messages::COMMENT_DELETED))
    }

    pub fn like_comment(&mut self, tok: AuthToken, data: LikeComment) -> Result<LikeOutcome, Error> {
        let caller = self.resolve(tok)?;
        let comment = self.comment_mut(data.comment)?;
        comment.updated_at = Utc::now();
        let liked = comment.toggle_like(caller);
        Ok(LikeOutcome {
            message: String::from(match liked {
                true => messages::COMMENT_LIKED,
                false => messages::COMMENT_UNLIKED,
            }),
            liked,
            likes: comment.like_count(),
        })
    }

    pub fn create_reply(
        &mut self,
        tok: AuthToken,
        comment: CommentId,
        data: NewReply,
    ) -> Result<ReplyInfo, Error> {
        let caller = self.resolve(tok)?;
        data.validate()?;
        let author_name = self.display_name(caller)?;
        let mentioned_user_name = match data.mentioned_user {
            None => None,
            Some(mentioned) => Some(self.display_name(mentioned)?),
        };
        let reply = Reply {
            id: ReplyId(Uuid::new_v4()),
            author: caller,
            author_name,
            mentioned_user: data.mentioned_user,
            mentioned_user_name,
            content: data.content,
            created_at: Utc::now(),
        };
        let comment = self.comment_mut(comment)?;
        comment.updated_at = Utc::now();
        comment.push_reply(reply.clone());
        Ok(ReplyInfo {
            message: String::from(messages::REPLY_CREATED),
            reply,
        })
    }

    pub fn delete_reply(
        &mut self,
        tok: AuthToken,
        comment: CommentId,
        reply: ReplyId,
    ) -> Result<Ack, Error> {
        let caller = self.resolve(tok)?;
        let comment = self.comment_mut(comment)?;
        comment.updated_at = Utc::now();
        let author = comment
            .replies
            .iter()
            .find(|r| r.id == reply)
            .map(|r| r.author)
            .ok_or(Error::ReplyNotFound(reply))?;
        if author != caller {
            return Err(Error::PermissionDenied);
        }
        comment.remove_reply(reply);
        Ok(Ack::new(messages::REPLY_DELETED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with_users(names: &[&str]) -> (MockServer, Vec<(UserId, AuthToken)>) {
        let mut mock = MockServer::new();
        let mut out = Vec::new();
        for name in names {
            mock.admin_create_user(NewUser::new(
                UserId(Uuid::new_v4()),
                String::from(*name),
                format!("{name}@example.com"),
                String::from("hunter2"),
            ))
            .expect("creating user");
            let session = mock
                .signin(NewSession {
                    user: String::from(*name),
                    password: String::from("hunter2"),
                    device: String::from("test"),
                })
                .expect("signing in");
            out.push((session.user.id, session.access_token));
        }
        (mock, out)
    }

    fn post_for(mock: &mut MockServer, tok: AuthToken) -> PostId {
        mock.add_post(
            tok,
            String::from("Hello"),
            String::from("First post"),
            "cover.png",
        )
        .expect("adding post")
        .post
        .id
    }

    #[test]
    fn example_scenario() {
        let (mut mock, ids) = server_with_users(&["alice", "bob", "carol"]);
        let (alice, alice_tok) = ids[0];
        let (bob, bob_tok) = (ids[1].0, ids[1].1);
        let (_, carol_tok) = (ids[2].0, ids[2].1);
        let post = post_for(&mut mock, alice_tok);

        let comment = mock
            .create_comment(
                bob_tok,
                NewComment {
                    content: String::from("Nice post"),
                    post,
                },
            )
            .expect("creating comment")
            .comment;
        assert_eq!(comment.author, bob);
        assert_eq!(comment.author_name, "bob");
        assert_eq!(comment.liked_by, Vec::new());
        assert_eq!(comment.replies, Vec::new());

        let out = mock
            .like_comment(alice_tok, LikeComment { comment: comment.id })
            .expect("liking");
        assert!(out.liked);
        assert_eq!(out.likes, 1);
        let out = mock
            .like_comment(alice_tok, LikeComment { comment: comment.id })
            .expect("unliking");
        assert!(!out.liked);
        assert_eq!(out.likes, 0);

        let reply = mock
            .create_reply(
                carol_tok,
                comment.id,
                NewReply {
                    content: String::from("Thanks!"),
                    mentioned_user: Some(alice),
                },
            )
            .expect("replying")
            .reply;
        assert_eq!(reply.author_name, "carol");
        assert_eq!(reply.mentioned_user, Some(alice));
        assert_eq!(reply.mentioned_user_name.as_deref(), Some("alice"));

        let listed = mock.get_comments(post).expect("listing").comments;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].replies, vec![reply.clone()]);

        mock.delete_reply(carol_tok, comment.id, reply.id)
            .expect("deleting reply");
        let listed = mock.get_comments(post).expect("listing").comments;
        assert_eq!(listed[0].replies, Vec::new());
    }

    #[test]
    fn toggle_many_distinct_callers() {
        let names: Vec<String> = (0..10).map(|i| format!("user{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(|n| n as &str).collect();
        let (mut mock, ids) = server_with_users(&name_refs);
        let post = post_for(&mut mock, ids[0].1);
        let comment = mock
            .create_comment(
                ids[0].1,
                NewComment {
                    content: String::from("popular"),
                    post,
                },
            )
            .expect("creating comment")
            .comment;
        for (_, tok) in &ids {
            let out = mock
                .like_comment(*tok, LikeComment { comment: comment.id })
                .expect("liking");
            assert!(out.liked);
        }
        let listed = mock.get_comments(post).expect("listing").comments;
        assert_eq!(listed[0].like_count(), ids.len());
    }

    #[test]
    fn reply_deletion_preserves_order() {
        let (mut mock, ids) = server_with_users(&["alice"]);
        let (_, tok) = ids[0];
        let post = post_for(&mut mock, tok);
        let comment = mock
            .create_comment(
                tok,
                NewComment {
                    content: String::from("thread"),
                    post,
                },
            )
            .expect("creating comment")
            .comment;
        let mut replies = Vec::new();
        for content in ["A", "B", "C"] {
            replies.push(
                mock.create_reply(
                    tok,
                    comment.id,
                    NewReply {
                        content: String::from(content),
                        mentioned_user: None,
                    },
                )
                .expect("replying")
                .reply
                .id,
            );
        }
        mock.delete_reply(tok, comment.id, replies[1])
            .expect("deleting reply");
        let listed = mock.get_comments(post).expect("listing").comments;
        let left: Vec<ReplyId> = listed[0].replies.iter().map(|r| r.id).collect();
        assert_eq!(left, vec![replies[0], replies[2]]);
        assert_eq!(
            mock.delete_reply(tok, comment.id, replies[1]),
            Err(Error::ReplyNotFound(replies[1])),
        );
    }

    #[test]
    fn only_the_author_may_mutate() {
        let (mut mock, ids) = server_with_users(&["alice", "mallory"]);
        let (_, alice_tok) = ids[0];
        let (_, mallory_tok) = ids[1];
        let post = post_for(&mut mock, alice_tok);
        let comment = mock
            .create_comment(
                alice_tok,
                NewComment {
                    content: String::from("mine"),
                    post,
                },
            )
            .expect("creating comment")
            .comment;
        assert_eq!(
            mock.update_comment(
                mallory_tok,
                EditComment {
                    comment: comment.id,
                    content: String::from("pwned"),
                },
            ),
            Err(Error::PermissionDenied),
        );
        assert_eq!(
            mock.delete_comment(mallory_tok, comment.id),
            Err(Error::PermissionDenied),
        );
        // mutating while unauthenticated is denied before anything else
        assert_eq!(
            mock.delete_comment(AuthToken::stub(), comment.id),
            Err(Error::PermissionDenied),
        );
        mock.delete_comment(alice_tok, comment.id)
            .expect("author deleting");
        assert_eq!(
            mock.delete_comment(alice_tok, comment.id),
            Err(Error::CommentNotFound(comment.id)),
        );
        assert_eq!(mock.get_comments(post).expect("listing").comments, Vec::new());
    }

    #[test]
    fn deleted_post_takes_its_comments() {
        let (mut mock, ids) = server_with_users(&["alice"]);
        let (_, tok) = ids[0];
        let post = post_for(&mut mock, tok);
        mock.create_comment(
            tok,
            NewComment {
                content: String::from("soon gone"),
                post,
            },
        )
        .expect("creating comment");
        mock.delete_post(tok, DeletePost { post }).expect("deleting post");
        assert_eq!(mock.get_comments(post).expect("listing").comments, Vec::new());
        assert_eq!(
            mock.create_comment(
                tok,
                NewComment {
                    content: String::from("too late"),
                    post,
                },
            ),
            Err(Error::PostNotFound(post)),
        );
    }

    #[test]
    fn signup_needs_verification() {
        let mut mock = MockServer::new();
        mock.signup(SignUp {
            username: String::from("dave"),
            email: String::from("dave@example.com"),
            password: String::from("hunter2"),
        })
        .expect("signing up");
        let session = NewSession {
            user: String::from("dave"),
            password: String::from("hunter2"),
            device: String::from("test"),
        };
        assert_eq!(mock.signin(session.clone()), Err(Error::EmailNotVerified));
        let token = mock
            .test_verification_token("dave")
            .expect("verification token exists");
        mock.verify_email(token).expect("verifying");
        assert_eq!(mock.verify_email(token), Err(Error::InvalidToken));
        let info = mock.signin(session).expect("signing in");
        assert_eq!(info.user.name, "dave");
        assert_eq!(
            mock.signin(NewSession {
                user: String::from("dave"),
                password: String::from("wrong"),
                device: String::from("test"),
            }),
            Err(Error::InvalidCredentials),
        );
    }
}
