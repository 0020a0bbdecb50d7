use uuid::Uuid;

use crate::{validate_required, Error, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub title: String,
    pub content: String,
    pub front_image: String,
    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeletePost {
    pub post: PostId,
}

/// Partial edit: absent fields keep their value, the image is replaced only
/// when the multipart request carries a new file
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct EditPost {
    pub post: PostId,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl EditPost {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(title) = &self.title {
            validate_required("title", title)?;
        }
        if let Some(content) = &self.content {
            validate_required("content", content)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

pub fn validate_new_post(title: &str, content: &str) -> Result<(), Error> {
    validate_required("title", title)?;
    validate_required("content", content)?;
    Ok(())
}
