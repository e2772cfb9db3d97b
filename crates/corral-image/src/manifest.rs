//! Image manifest resolution.
//!
//! Only the `layers` list of a v2 image manifest is consumed; the config
//! blob, schema version and media type are ignored since the image's own
//! entrypoint and environment are never used.

use corral_common::config::RegistryConfig;
use corral_common::constants::{MAX_IMAGE_LAYERS, MEDIA_TYPE_DOCKER_MANIFEST};
use corral_common::error::{CorralError, Result};
use corral_common::types::{AuthToken, LayerDescriptor};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestBody {
    layers: Option<Vec<LayerDescriptor>>,
    media_type: Option<String>,
}

/// Decodes the ordered layer list from a manifest body.
///
/// # Errors
///
/// Returns a description of the problem if the body is not a JSON object of
/// the expected shape, has no `layers` (as with a manifest list), or has
/// more than [`MAX_IMAGE_LAYERS`] layers.
pub fn decode_layers(body: &[u8]) -> std::result::Result<Vec<LayerDescriptor>, String> {
    let manifest: ManifestBody =
        serde_json::from_slice(body).map_err(|e| format!("undecodable manifest: {e}"))?;
    let layers = manifest.layers.ok_or_else(|| {
        format!(
            "manifest of type {} has no layers; manifest lists are not supported",
            manifest.media_type.as_deref().unwrap_or("<unspecified>")
        )
    })?;
    if layers.len() > MAX_IMAGE_LAYERS {
        return Err(format!(
            "manifest lists {} layers, more than the {MAX_IMAGE_LAYERS} supported",
            layers.len()
        ));
    }
    Ok(layers)
}

/// Fetches the manifest for `repository` at `reference` and returns its layers.
///
/// # Errors
///
/// Returns `CorralError::Auth` if `token` belongs to another repository and
/// `CorralError::Manifest` on transport failure, a non-2xx status, or a
/// body [`decode_layers`] rejects.
pub fn resolve_layers(
    client: &Client,
    config: &RegistryConfig,
    repository: &str,
    reference: &str,
    token: &AuthToken,
) -> Result<Vec<LayerDescriptor>> {
    token.ensure_scope(repository)?;
    let fail = |message: String| CorralError::Manifest {
        repository: repository.to_string(),
        reference: reference.to_string(),
        message,
    };
    let url = config.manifest_url(repository, reference);
    tracing::info!(repository, reference, "resolving manifest");

    let response = client
        .get(&url)
        .header(AUTHORIZATION, token.bearer())
        .header(ACCEPT, MEDIA_TYPE_DOCKER_MANIFEST)
        .send()
        .map_err(|e| fail(format!("manifest request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("manifest endpoint returned HTTP {status}")));
    }

    let body = response
        .bytes()
        .map_err(|e| fail(format!("cannot read manifest body: {e}")))?;
    let layers = decode_layers(&body).map_err(fail)?;

    tracing::info!(repository, reference, layers = layers.len(), "manifest resolved");
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config_for(server: &MockServer) -> RegistryConfig {
        RegistryConfig {
            auth_url: server.url("/token"),
            auth_service: "registry.docker.io".into(),
            registry_url: server.base_url(),
        }
    }

    #[test]
    fn decode_keeps_manifest_order() {
        let body = json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_DOCKER_MANIFEST,
            "config": { "digest": "sha256:cfg", "size": 1 },
            "layers": [
                { "digest": "sha256:bottom", "size": 10 },
                { "digest": "sha256:middle", "size": 20 },
                { "digest": "sha256:top", "size": 30 }
            ]
        });
        let layers = decode_layers(body.to_string().as_bytes()).expect("decode");
        let digests: Vec<_> = layers.iter().map(|l| l.digest.as_str()).collect();
        assert_eq!(digests, ["sha256:bottom", "sha256:middle", "sha256:top"]);
    }

    #[test]
    fn decode_rejects_manifest_list() {
        let body = json!({
            "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
            "manifests": []
        });
        let err = decode_layers(body.to_string().as_bytes()).expect_err("no layers");
        assert!(err.contains("manifest lists are not supported"));
    }

    #[test]
    fn decode_rejects_too_many_layers() {
        let layers: Vec<_> = (0..=MAX_IMAGE_LAYERS)
            .map(|i| json!({ "digest": format!("sha256:{i}") }))
            .collect();
        let body = json!({ "layers": layers });
        assert!(decode_layers(body.to_string().as_bytes()).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_layers(b"<html>").is_err());
        assert!(decode_layers(br#"{"layers": "nope"}"#).is_err());
    }

    #[test]
    fn resolve_sends_bearer_and_accept_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/library/redis/manifests/7")
                .header("authorization", "Bearer tok")
                .header("accept", MEDIA_TYPE_DOCKER_MANIFEST);
            then.status(200).json_body(json!({
                "layers": [{ "digest": "sha256:one" }, { "digest": "sha256:two" }]
            }));
        });

        let token = AuthToken::new("tok", "library/redis");
        let layers = resolve_layers(
            &Client::new(),
            &config_for(&server),
            "library/redis",
            "7",
            &token,
        )
        .expect("resolve");

        mock.assert();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].digest, "sha256:two");
    }

    #[test]
    fn resolve_accepts_digest_reference() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v2/library/redis/manifests/sha256:abc");
            then.status(200).json_body(json!({ "layers": [] }));
        });

        let token = AuthToken::new("tok", "library/redis");
        let layers = resolve_layers(
            &Client::new(),
            &config_for(&server),
            "library/redis",
            "sha256:abc",
            &token,
        )
        .expect("resolve");

        mock.assert();
        assert!(layers.is_empty());
    }

    #[test]
    fn resolve_non_success_is_manifest_error() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/v2/library/redis/manifests/nope");
            then.status(404).body("unknown tag");
        });

        let token = AuthToken::new("tok", "library/redis");
        let result = resolve_layers(
            &Client::new(),
            &config_for(&server),
            "library/redis",
            "nope",
            &token,
        );
        assert!(matches!(result, Err(CorralError::Manifest { .. })));
    }

    #[test]
    fn resolve_refuses_token_for_other_repository() {
        let server = MockServer::start();
        let token = AuthToken::new("tok", "library/alpine");
        let result = resolve_layers(
            &Client::new(),
            &config_for(&server),
            "library/redis",
            "latest",
            &token,
        );
        assert!(matches!(result, Err(CorralError::Auth { .. })));
    }
}
