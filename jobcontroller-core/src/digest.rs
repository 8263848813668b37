//! Resolves a mutable image tag to a content-addressed digest reference.
//!
//! Grounded in the source's `find_sha256_of_image`: request an anonymous
//! pull-scoped token, fetch the v2 manifest for the tag, and hash the raw
//! manifest body. Any failure along the way returns the original reference
//! unchanged rather than failing the job — digest pinning is best-effort.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::DigestResolutionError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Resolves `image` (e.g. `ghcr.io/org/name:1.2.3`) to a digest-pinned
/// reference (`ghcr.io/org/name@sha256:...`). Returns `image` unchanged if it
/// already carries a digest, or if resolution fails for any reason.
pub async fn resolve_image_digest(client: &reqwest::Client, registry: &str, image: &str) -> String {
    if image.contains("sha256:") {
        return image.to_string();
    }

    match try_resolve(client, registry, image).await {
        Ok(resolved) => resolved,
        Err(error) => {
            warn!(image, %error, "failed to resolve image digest, using reference unchanged");
            image.to_string()
        }
    }
}

async fn try_resolve(
    client: &reqwest::Client,
    registry: &str,
    image: &str,
) -> Result<String, DigestResolutionError> {
    let (org, name, tag) = split_org_image_tag(image)?;
    let user_image = format!("{org}/{name}");

    let token_url = format!("https://{registry}/token?scope=repository:{user_image}:pull");
    let token_response: TokenResponse = client
        .get(&token_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await?
        .json()
        .await?;

    let manifest_url = format!("https://{registry}/v2/{user_image}/manifests/{tag}");
    let manifest_bytes = client
        .get(&manifest_url)
        .bearer_auth(&token_response.token)
        .header(
            "Accept",
            "application/vnd.docker.distribution.manifest.v2+json",
        )
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await?
        .bytes()
        .await?;

    let digest = hex_sha256(&manifest_bytes);
    Ok(format!("{registry}/{user_image}@sha256:{digest}"))
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Splits `[scheme://]registry/org/image:tag` into `(org, image, tag)`,
/// discarding any scheme and the leading registry host segment.
fn split_org_image_tag(image: &str) -> Result<(String, String, String), DigestResolutionError> {
    let without_scheme = image.split("://").next_back().unwrap_or(image);
    let segments: Vec<&str> = without_scheme.split('/').collect();
    if segments.len() < 3 {
        return Err(DigestResolutionError::Unparseable(image.to_string()));
    }
    let org = segments[segments.len() - 2].to_string();
    let (name, tag) = segments[segments.len() - 1]
        .split_once(':')
        .ok_or_else(|| DigestResolutionError::Unparseable(image.to_string()))?;
    Ok((org, name.to_string(), tag.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_reference() {
        let (org, name, tag) = split_org_image_tag("ghcr.io/fiaisis/mantid:6.9.1").unwrap();
        assert_eq!(org, "fiaisis");
        assert_eq!(name, "mantid");
        assert_eq!(tag, "6.9.1");
    }

    #[test]
    fn splits_reference_with_scheme() {
        let (org, name, tag) = split_org_image_tag("https://ghcr.io/fiaisis/mantid:6.9.1").unwrap();
        assert_eq!(org, "fiaisis");
        assert_eq!(name, "mantid");
        assert_eq!(tag, "6.9.1");
    }

    #[test]
    fn rejects_reference_without_tag() {
        assert!(split_org_image_tag("ghcr.io/fiaisis/mantid").is_err());
    }

    #[tokio::test]
    async fn digest_already_present_is_returned_unchanged() {
        let client = reqwest::Client::new();
        let image = "ghcr.io/fiaisis/mantid@sha256:abc123";
        assert_eq!(
            resolve_image_digest(&client, "ghcr.io", image).await,
            image
        );
    }

    #[tokio::test]
    async fn unparseable_reference_falls_back_unchanged() {
        let client = reqwest::Client::new();
        let image = "not-a-valid-reference";
        assert_eq!(
            resolve_image_digest(&client, "ghcr.io", image).await,
            image
        );
    }
}
