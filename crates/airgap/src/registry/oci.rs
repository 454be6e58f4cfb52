//! OCI distribution registry client.
//!
//! Speaks the `/v2/` registry API with anonymous, basic or bearer-token
//! authentication. Pulls are streamed blob by blob into a tar archive that
//! contains both an OCI image layout and a Docker `manifest.json`, so the
//! same file can be fed to `docker load` and `podman load`.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::reference::ImageReference;
use crate::registry::Registry;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

const MEDIA_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
const MEDIA_DOCKER_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const MEDIA_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const MEDIA_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Manifests and indexes are small; anything bigger is not a manifest.
const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;

const USER_AGENT: &str = concat!("fogctl-airgap/", env!("CARGO_PKG_VERSION"));

/// Username and password for a registry host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Registry username.
    pub username: String,
    /// Password or access token.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn basic_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Registry client over HTTPS.
///
/// # Example
///
/// ```no_run
/// use airgap::{Credentials, ImageReference, OciRegistry, Platform, Registry};
///
/// let registry = OciRegistry::new()
///     .with_credentials("ghcr.io", Credentials::new("bot", "token"));
/// let image = ImageReference::parse("ghcr.io/acme/agent:3.1").unwrap();
/// let digest = registry.resolve_digest(&image, &Platform::linux_arm64()).unwrap();
/// println!("{}", digest);
/// ```
pub struct OciRegistry {
    agent: ureq::Agent,
    credentials: HashMap<String, Credentials>,
    plain_http: HashSet<String>,
    tokens: Mutex<HashMap<String, String>>,
}

/// A manifest narrowed to one platform.
#[derive(Debug, Clone)]
struct ResolvedManifest {
    digest: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl OciRegistry {
    /// Create a client with no credentials.
    #[must_use]
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            credentials: HashMap::new(),
            plain_http: HashSet::new(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Use `credentials` for a registry host (as written in references).
    #[must_use]
    pub fn with_credentials(mut self, host: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(host.into(), credentials);
        self
    }

    /// Talk plain HTTP to a host (local mirrors).
    #[must_use]
    pub fn with_plain_http(mut self, host: impl Into<String>) -> Self {
        self.plain_http.insert(host.into());
        self
    }

    fn base_url(&self, image: &ImageReference) -> String {
        let host = image.api_host();
        let scheme = if self.plain_http.contains(image.registry())
            || host.starts_with("localhost")
            || host.starts_with("127.0.0.1")
        {
            "http"
        } else {
            "https"
        };
        format!("{}://{}", scheme, host)
    }

    fn credentials_for(&self, image: &ImageReference) -> Option<&Credentials> {
        self.credentials
            .get(image.registry())
            .or_else(|| self.credentials.get(image.api_host()))
    }

    fn token_key(image: &ImageReference) -> String {
        format!("{}/{}", image.api_host(), image.repository())
    }

    fn cached_authorization(&self, image: &ImageReference) -> Option<String> {
        let tokens = self.tokens.lock().ok()?;
        tokens.get(&Self::token_key(image)).cloned()
    }

    /// GET with one authentication round-trip on 401.
    fn get(
        &self,
        image: &ImageReference,
        url: &str,
        accept: Option<&str>,
    ) -> Result<ureq::http::Response<ureq::Body>> {
        let mut authorization = self.cached_authorization(image);

        for attempt in 0..2 {
            let mut request = self.agent.get(url).header("User-Agent", USER_AGENT);
            if let Some(accept) = accept {
                request = request.header("Accept", accept);
            }
            if let Some(value) = &authorization {
                request = request.header("Authorization", value.as_str());
            }

            let response = request.call()?;
            let status = response.status().as_u16();

            if status == 401 && attempt == 0 {
                let challenge = response
                    .headers()
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                log::debug!("{} requires authentication ({})", url, challenge);
                authorization = Some(self.authorize(image, &challenge)?);
                continue;
            }
            if !(200..300).contains(&status) {
                return Err(Error::http(format!("GET {} returned HTTP {}", url, status), Some(status)));
            }
            return Ok(response);
        }

        Err(Error::http(
            format!("GET {}: credentials rejected by registry", url),
            Some(401),
        ))
    }

    /// Answer a `WWW-Authenticate` challenge with an `Authorization` value.
    fn authorize(&self, image: &ImageReference, challenge: &str) -> Result<String> {
        let credentials = self.credentials_for(image);
        let Some((scheme, params)) = parse_challenge(challenge) else {
            return Err(Error::Registry {
                image: image.to_string(),
                message: format!("unsupported authentication challenge {:?}", challenge),
            });
        };

        let authorization = if scheme.eq_ignore_ascii_case("basic") {
            match credentials {
                Some(credentials) => credentials.basic_header(),
                None => {
                    return Err(Error::http(
                        format!("{} requires credentials", image.registry()),
                        Some(401),
                    ));
                }
            }
        } else if scheme.eq_ignore_ascii_case("bearer") {
            let realm = params.get("realm").ok_or_else(|| Error::Registry {
                image: image.to_string(),
                message: "bearer challenge without realm".to_string(),
            })?;
            let scope = params
                .get("scope")
                .cloned()
                .unwrap_or_else(|| format!("repository:{}:pull", image.repository()));

            let mut request = self
                .agent
                .get(realm.as_str())
                .header("User-Agent", USER_AGENT)
                .query("scope", &scope);
            if let Some(service) = params.get("service") {
                request = request.query("service", service);
            }
            if let Some(credentials) = credentials {
                request = request.header("Authorization", credentials.basic_header());
            }

            let mut response = request.call()?;
            let status = response.status().as_u16();
            if !(200..300).contains(&status) {
                return Err(Error::http(
                    format!("token request to {} returned HTTP {}", realm, status),
                    Some(status),
                ));
            }
            let token: TokenResponse = response.body_mut().read_json()?;
            let value = token.token.or(token.access_token).ok_or_else(|| {
                Error::InvalidResponse(format!("token response from {} has no token", realm))
            })?;
            format!("Bearer {}", value)
        } else {
            return Err(Error::Registry {
                image: image.to_string(),
                message: format!("unsupported authentication scheme {}", scheme),
            });
        };

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(Self::token_key(image), authorization.clone());
        }
        Ok(authorization)
    }

    fn fetch_manifest(
        &self,
        image: &ImageReference,
        reference: &str,
    ) -> Result<(Vec<u8>, String, Option<String>)> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.base_url(image),
            image.repository(),
            reference
        );
        let accept = [
            MEDIA_OCI_INDEX,
            MEDIA_DOCKER_LIST,
            MEDIA_OCI_MANIFEST,
            MEDIA_DOCKER_MANIFEST,
        ]
        .join(", ");

        let mut response = self.get(image, &url, Some(&accept))?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        };
        let content_type = header("content-type");
        let digest = header("docker-content-digest");

        let bytes = response
            .body_mut()
            .with_config()
            .limit(MAX_MANIFEST_SIZE)
            .read_to_vec()?;

        let media_type = match content_type {
            Some(ct) if ct != "application/json" => ct,
            _ => serde_json::from_slice::<MediaTypeOnly>(&bytes)?
                .media_type
                .unwrap_or_else(|| MEDIA_OCI_MANIFEST.to_string()),
        };

        Ok((bytes, media_type, digest))
    }

    /// Resolve the manifest for one platform.
    ///
    /// With `fetch_body == false` an index entry's descriptor digest is
    /// returned without downloading the platform manifest itself.
    fn resolve(
        &self,
        image: &ImageReference,
        platform: &Platform,
        fetch_body: bool,
    ) -> Result<ResolvedManifest> {
        let (bytes, media_type, header_digest) =
            self.fetch_manifest(image, image.manifest_reference())?;

        if media_type != MEDIA_OCI_INDEX && media_type != MEDIA_DOCKER_LIST {
            let digest = header_digest.unwrap_or_else(|| sha256_digest(&bytes));
            log::debug!("{} is a single-platform image ({})", image, digest);
            return Ok(ResolvedManifest {
                digest,
                media_type,
                bytes,
            });
        }

        let index: ManifestIndex = serde_json::from_slice(&bytes)?;
        let descriptor =
            select_manifest(&index, platform).ok_or_else(|| Error::PlatformNotFound {
                image: image.to_string(),
                platform: platform.to_string(),
            })?;
        log::debug!(
            "{} resolved to {} for {}",
            image,
            descriptor.digest,
            platform
        );

        if !fetch_body {
            return Ok(ResolvedManifest {
                digest: descriptor.digest.clone(),
                media_type: descriptor.media_type.clone().unwrap_or_default(),
                bytes: Vec::new(),
            });
        }

        let (bytes, media_type, _) = self.fetch_manifest(image, &descriptor.digest)?;
        let actual = sha256_digest(&bytes);
        if actual != descriptor.digest {
            return Err(Error::DigestMismatch {
                expected: descriptor.digest.clone(),
                actual,
            });
        }
        Ok(ResolvedManifest {
            digest: descriptor.digest.clone(),
            media_type,
            bytes,
        })
    }

    /// Stream one blob into the archive, verifying size and digest.
    fn copy_blob<W: Write>(
        &self,
        image: &ImageReference,
        descriptor: &Descriptor,
        archive: &mut tar::Builder<W>,
        dest: &Path,
    ) -> Result<()> {
        let path = blob_path(&descriptor.digest)?;
        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.base_url(image),
            image.repository(),
            descriptor.digest
        );
        log::debug!("Fetching blob {} ({} bytes)", descriptor.digest, descriptor.size);

        let response = self.get(image, &url, None)?;
        let mut reader = HashingReader::new(response.into_body().into_reader().take(descriptor.size));

        let mut header = tar::Header::new_gnu();
        header.set_size(descriptor.size);
        header.set_mode(0o644);
        archive
            .append_data(&mut header, &path, &mut reader)
            .map_err(|e| Error::io(dest, e))?;

        if reader.count != descriptor.size {
            return Err(Error::Registry {
                image: image.to_string(),
                message: format!(
                    "blob {} truncated: expected {} bytes, got {}",
                    descriptor.digest, descriptor.size, reader.count
                ),
            });
        }
        let actual = reader.digest();
        if actual != descriptor.digest {
            return Err(Error::DigestMismatch {
                expected: descriptor.digest.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl Default for OciRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for OciRegistry {
    fn resolve_digest(&self, image: &ImageReference, platform: &Platform) -> Result<String> {
        Ok(self.resolve(image, platform, false)?.digest)
    }

    fn pull(
        &self,
        image: &ImageReference,
        platform: &Platform,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<String> {
        cancel.check()?;
        let manifest = self.resolve(image, platform, true)?;
        let parsed: ImageManifest = serde_json::from_slice(&manifest.bytes)?;

        let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
        let mut archive = tar::Builder::new(BufWriter::new(file));

        append_bytes(&mut archive, "oci-layout", br#"{"imageLayoutVersion":"1.0.0"}"#, dest)?;
        append_bytes(
            &mut archive,
            &blob_path(&manifest.digest)?,
            &manifest.bytes,
            dest,
        )?;

        for descriptor in std::iter::once(&parsed.config).chain(parsed.layers.iter()) {
            cancel.check()?;
            self.copy_blob(image, descriptor, &mut archive, dest)?;
        }

        let index = json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": manifest.media_type,
                "digest": manifest.digest,
                "size": manifest.bytes.len(),
                "annotations": {
                    "io.containerd.image.name": image.repo_tag(),
                    "org.opencontainers.image.ref.name": image.tag().unwrap_or("latest"),
                },
            }],
        });
        append_bytes(&mut archive, "index.json", &serde_json::to_vec(&index)?, dest)?;

        let layers = parsed
            .layers
            .iter()
            .map(|layer| blob_path(&layer.digest))
            .collect::<Result<Vec<_>>>()?;
        let docker_manifest = json!([{
            "Config": blob_path(&parsed.config.digest)?,
            "RepoTags": [image.repo_tag()],
            "Layers": layers,
        }]);
        append_bytes(
            &mut archive,
            "manifest.json",
            &serde_json::to_vec(&docker_manifest)?,
            dest,
        )?;

        let mut writer = archive.into_inner().map_err(|e| Error::io(dest, e))?;
        writer.flush().map_err(|e| Error::io(dest, e))?;

        log::info!(
            "Pulled {} for {} ({} layers)",
            image,
            platform,
            parsed.layers.len()
        );
        Ok(manifest.digest)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn append_bytes<W: Write>(
    archive: &mut tar::Builder<W>,
    path: &str,
    bytes: &[u8],
    dest: &Path,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    archive
        .append_data(&mut header, path, bytes)
        .map_err(|e| Error::io(dest, e))
}

/// `sha256:<hex>` of a byte slice.
fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Archive path of a blob; rejects anything but a well-formed sha256 digest.
fn blob_path(digest: &str) -> Result<String> {
    match digest.strip_prefix("sha256:") {
        Some(hex) if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            Ok(format!("blobs/sha256/{}", hex))
        }
        _ => Err(Error::InvalidResponse(format!(
            "unsupported blob digest {:?}",
            digest
        ))),
    }
}

/// Pick the index entry for a platform.
fn select_manifest<'a>(index: &'a ManifestIndex, platform: &Platform) -> Option<&'a Descriptor> {
    index.manifests.iter().find(|descriptor| {
        descriptor.platform.as_ref().is_some_and(|p| {
            platform.matches(&p.os, &p.architecture, p.variant.as_deref())
        })
    })
}

/// Split a `WWW-Authenticate` header into scheme and parameters.
fn parse_challenge(header: &str) -> Option<(String, HashMap<String, String>)> {
    let header = header.trim();
    let (scheme, rest) = match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None if !header.is_empty() => (header, ""),
        None => return None,
    };

    let mut params = HashMap::new();
    let mut chars = rest.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }
        let value: String = if chars.peek() == Some(&'"') {
            chars.next();
            chars.by_ref().take_while(|c| *c != '"').collect()
        } else {
            chars.by_ref().take_while(|c| *c != ',').collect()
        };
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Some((scheme.to_string(), params))
}

/// Reader that hashes and counts everything passing through.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    count: u64,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            count: 0,
        }
    }

    fn digest(&self) -> String {
        format!("sha256:{}", hex::encode(self.hasher.clone().finalize()))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

// =============================================================================
// Registry API types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaTypeOnly {
    media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestIndex {
    manifests: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct ImageManifest {
    config: Descriptor,
    layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    media_type: Option<String>,
    digest: String,
    size: u64,
    platform: Option<DescriptorPlatform>,
}

#[derive(Debug, Clone, Deserialize)]
struct DescriptorPlatform {
    os: String,
    architecture: String,
    variant: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {"mediaType": "application/vnd.oci.image.manifest.v1+json",
             "digest": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
             "size": 1000, "platform": {"os": "linux", "architecture": "amd64"}},
            {"mediaType": "application/vnd.oci.image.manifest.v1+json",
             "digest": "sha256:2222222222222222222222222222222222222222222222222222222222222222",
             "size": 1000, "platform": {"os": "linux", "architecture": "arm", "variant": "v7"}},
            {"mediaType": "application/vnd.oci.image.manifest.v1+json",
             "digest": "sha256:3333333333333333333333333333333333333333333333333333333333333333",
             "size": 1000, "platform": {"os": "linux", "architecture": "arm64", "variant": "v8"}},
            {"mediaType": "application/vnd.oci.image.manifest.v1+json",
             "digest": "sha256:4444444444444444444444444444444444444444444444444444444444444444",
             "size": 500, "platform": {"os": "unknown", "architecture": "unknown"}}
        ]
    }"#;

    #[test]
    fn test_select_manifest_by_platform() {
        let index: ManifestIndex = serde_json::from_str(INDEX).unwrap();

        let amd = select_manifest(&index, &Platform::linux_amd64()).unwrap();
        assert!(amd.digest.starts_with("sha256:1111"));

        let arm = select_manifest(&index, &Platform::linux_arm64()).unwrap();
        assert!(arm.digest.starts_with("sha256:3333"));

        let riscv = Platform::new("linux", "riscv64");
        assert!(select_manifest(&index, &riscv).is_none());
    }

    #[test]
    fn test_parse_bearer_challenge() {
        let (scheme, params) = parse_challenge(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull,push""#,
        )
        .unwrap();
        assert_eq!(scheme, "Bearer");
        assert_eq!(params["realm"], "https://auth.docker.io/token");
        assert_eq!(params["service"], "registry.docker.io");
        assert_eq!(params["scope"], "repository:library/nginx:pull,push");
    }

    #[test]
    fn test_parse_basic_challenge() {
        let (scheme, params) = parse_challenge(r#"Basic realm="Registry""#).unwrap();
        assert_eq!(scheme, "Basic");
        assert_eq!(params["realm"], "Registry");

        assert!(parse_challenge("").is_none());
    }

    #[test]
    fn test_blob_path() {
        let digest = format!("sha256:{}", "ab".repeat(32));
        assert_eq!(blob_path(&digest).unwrap(), format!("blobs/sha256/{}", "ab".repeat(32)));
        assert!(blob_path("sha256:../../etc/passwd").is_err());
        assert!(blob_path("sha512:abcd").is_err());
    }

    #[test]
    fn test_hashing_reader() {
        let data = b"hello layer";
        let mut reader = HashingReader::new(&data[..]);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(reader.count, data.len() as u64);
        assert_eq!(reader.digest(), sha256_digest(data));
    }

    #[test]
    fn test_credentials_basic_header() {
        let credentials = Credentials::new("bot", "secret");
        assert_eq!(credentials.basic_header(), "Basic Ym90OnNlY3JldA==");
    }

    #[test]
    fn test_plain_http_for_localhost() {
        let registry = OciRegistry::new().with_plain_http("mirror.lan:5000");
        let local = ImageReference::parse("localhost:5000/agent:1").unwrap();
        let mirror = ImageReference::parse("mirror.lan:5000/agent:1").unwrap();
        let hub = ImageReference::parse("nginx").unwrap();
        assert_eq!(registry.base_url(&local), "http://localhost:5000");
        assert_eq!(registry.base_url(&mirror), "http://mirror.lan:5000");
        assert_eq!(registry.base_url(&hub), "https://registry-1.docker.io");
    }
}
