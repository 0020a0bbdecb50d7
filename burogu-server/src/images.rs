use std::fmt::Write;

use anyhow::Context;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const UPLOAD_FOLDER: &str = "blogs";

/// Hosted image blob, as returned by the upload endpoint
#[derive(Clone, Debug, serde::Deserialize)]
pub struct StoredImage {
    pub public_id: String,
    #[serde(rename = "secure_url")]
    pub url: String,
}

/// Client for a Cloudinary-style image hosting REST API. The stub variant
/// fabricates URLs without any network traffic and backs the test setups.
#[derive(Clone)]
pub enum ImageStore {
    Remote {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        api_secret: String,
    },
    Stub,
}

impl ImageStore {
    pub fn from_env() -> anyhow::Result<ImageStore> {
        match std::env::var("IMAGE_API_BASE") {
            Err(_) => {
                tracing::warn!("IMAGE_API_BASE is not set, storing stub image links only");
                Ok(ImageStore::Stub)
            }
            Ok(base_url) => Ok(ImageStore::Remote {
                client: reqwest::Client::new(),
                base_url,
                api_key: std::env::var("IMAGE_API_KEY")
                    .context("retrieving IMAGE_API_KEY environment variable")?,
                api_secret: std::env::var("IMAGE_API_SECRET")
                    .context("retrieving IMAGE_API_SECRET environment variable")?,
            }),
        }
    }

    pub fn stub() -> ImageStore {
        ImageStore::Stub
    }

    pub async fn upload(&self, filename: &str, data: Vec<u8>) -> anyhow::Result<StoredImage> {
        let public_id = format!("{}/{}", UPLOAD_FOLDER, Uuid::new_v4());
        match self {
            ImageStore::Stub => Ok(StoredImage {
                url: format!("https://images.invalid/{public_id}/{filename}"),
                public_id,
            }),
            ImageStore::Remote {
                client,
                base_url,
                api_key,
                api_secret,
            } => {
                let timestamp = Utc::now().timestamp().to_string();
                let signature = sign(
                    &[("public_id", &public_id), ("timestamp", &timestamp)],
                    api_secret,
                );
                let form = reqwest::multipart::Form::new()
                    .part(
                        "file",
                        reqwest::multipart::Part::bytes(data).file_name(filename.to_owned()),
                    )
                    .text("public_id", public_id.clone())
                    .text("timestamp", timestamp)
                    .text("api_key", api_key.clone())
                    .text("signature_algorithm", "sha256")
                    .text("signature", signature);
                let resp = client
                    .post(format!("{base_url}/image/upload"))
                    .multipart(form)
                    .send()
                    .await
                    .context("uploading image")?
                    .error_for_status()
                    .context("image upload was rejected")?;
                resp.json()
                    .await
                    .context("parsing image upload response")
            }
        }
    }

    pub async fn delete(&self, public_id: &str) -> anyhow::Result<()> {
        match self {
            ImageStore::Stub => Ok(()),
            ImageStore::Remote {
                client,
                base_url,
                api_key,
                api_secret,
            } => {
                let timestamp = Utc::now().timestamp().to_string();
                let signature = sign(
                    &[("public_id", public_id), ("timestamp", &timestamp)],
                    api_secret,
                );
                client
                    .post(format!("{base_url}/image/destroy"))
                    .form(&[
                        ("public_id", public_id),
                        ("timestamp", &timestamp),
                        ("api_key", api_key),
                        ("signature_algorithm", "sha256"),
                        ("signature", &signature),
                    ])
                    .send()
                    .await
                    .with_context(|| format!("deleting image {public_id:?}"))?
                    .error_for_status()
                    .context("image deletion was rejected")?;
                Ok(())
            }
        }
    }
}

/// Request signature: sha256 over the sorted parameter string plus the secret
fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut params = params.to_vec();
    params.sort();
    let mut to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    to_sign.push_str(secret);
    let digest = Sha256::digest(to_sign.as_bytes());
    let mut hex = String::with_capacity(2 * digest.len());
    for b in digest {
        write!(&mut hex, "{b:02x}").expect("writing to a string");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sorted_and_hex() {
        let sig = sign(&[("timestamp", "10"), ("public_id", "blogs/x")], "secret");
        // sha256("public_id=blogs/x&timestamp=10secret")
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            sig,
            sign(&[("public_id", "blogs/x"), ("timestamp", "10")], "secret"),
        );
    }
}
