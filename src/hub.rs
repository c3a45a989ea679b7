//! Download of the pretrained model artifact from a Hugging Face style hub.

use std::{
    collections::HashSet,
    env,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

use crate::config::HubSettings;
use crate::http_client;

const MAX_ARTIFACT_BYTES: u64 = 2 * 1024 * 1024 * 1024;
const TOKEN_ENV: &str = "HF_TOKEN";
/// Comma-separated extra hosts the artifact may be fetched from.
pub const ALLOWED_HOSTS_ENV: &str = "CREDIT_SCORING_HUB_ALLOWED_HOSTS";
const DEFAULT_ALLOWED_HOSTS: &[&str] = &["huggingface.co"];
const LOOPBACK_HOSTS: &[&str] = &["127.0.0.1", "localhost", "[::1]"];

/// Options for fetching one file from a hub repository.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Repository identifier such as `owner/name`.
    pub repo_id: String,
    /// File path inside the repository.
    pub filename: String,
    /// Branch, tag or commit.
    pub revision: String,
    /// Hub base URL.
    pub endpoint: String,
    /// Local directory receiving the file.
    pub dest_dir: PathBuf,
    /// Optional SHA-256 (hex) the downloaded file must match.
    pub sha256: Option<String>,
    /// Download even when the file is already present locally.
    pub force: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        HubSettings::default().fetch_options()
    }
}

/// Errors returned while fetching a model artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid hub request {value}: {reason}")]
    InvalidRequest { value: String, reason: String },
    #[error("Hub URL {url} must use https")]
    InsecureUrl { url: String },
    #[error("Hub host '{host}' is not allowlisted; set {ALLOWED_HOSTS_ENV} to allow it")]
    HostNotAllowed { host: String },
    #[error("Invalid SHA-256 value; expected 64 hex characters, got '{0}'")]
    InvalidSha256(String),
    #[error("Failed to download {url}: HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("Failed to download {url}: {message}")]
    Transport { url: String, message: String },
    #[error("SHA-256 mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Ensure the artifact exists locally, downloading it if needed, and return its path.
///
/// A file already present in `dest_dir` is returned without network access
/// unless `force` is set or it fails the pinned SHA-256, in which case it is
/// downloaded again. Network failures are returned as-is; there is no retry.
pub fn download_model(options: &FetchOptions) -> Result<PathBuf, FetchError> {
    validate_filename(&options.filename)?;
    let dest = options.dest_dir.join(&options.filename);
    let parent = dest.parent().unwrap_or(options.dest_dir.as_path());
    fs::create_dir_all(parent).map_err(|source| FetchError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let expected_sha256 = options
        .sha256
        .as_deref()
        .map(normalize_sha256)
        .transpose()?;
    if dest.is_file() && !options.force {
        match expected_sha256.as_deref() {
            None => {
                tracing::info!("Using cached artifact {}", dest.display());
                return Ok(dest);
            }
            Some(expected) => {
                let actual = sha256_file(&dest)?;
                if actual == expected {
                    tracing::info!("Using cached artifact {} (sha256 verified)", dest.display());
                    return Ok(dest);
                }
                tracing::warn!(
                    "Cached artifact {} has sha256 {actual}, expected {expected}; downloading again",
                    dest.display()
                );
            }
        }
    }

    let url = resolve_url(options)?;
    validate_url(&url, &resolve_allowed_hosts())?;
    tracing::info!("Downloading {url}");
    let bytes = download_to_path(&url, &dest, expected_sha256.as_deref())?;
    tracing::info!("Downloaded {bytes} bytes to {}", dest.display());
    Ok(dest)
}

/// `{endpoint}/{repo_id}/resolve/{revision}/{filename}` with each segment percent-encoded.
pub fn resolve_url(options: &FetchOptions) -> Result<Url, FetchError> {
    let invalid = |value: &str, reason: &str| FetchError::InvalidRequest {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let repo_id = options.repo_id.trim();
    if repo_id.is_empty() || repo_id.split('/').any(str::is_empty) {
        return Err(invalid(repo_id, "repository id must look like owner/name"));
    }
    let revision = options.revision.trim();
    if revision.is_empty() {
        return Err(invalid(revision, "revision must not be empty"));
    }
    let mut url = Url::parse(options.endpoint.trim())
        .map_err(|err| invalid(&options.endpoint, &err.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid(&options.endpoint, "endpoint cannot be a base URL"))?
        .pop_if_empty()
        .extend(repo_id.split('/'))
        .push("resolve")
        .push(revision)
        .extend(options.filename.split('/'));
    Ok(url)
}

fn validate_filename(filename: &str) -> Result<(), FetchError> {
    let path = Path::new(filename);
    let escapes = path
        .components()
        .any(|component| !matches!(component, std::path::Component::Normal(_)));
    if filename.trim().is_empty() || escapes {
        return Err(FetchError::InvalidRequest {
            value: filename.to_string(),
            reason: "filename must be a relative path inside the repository".to_string(),
        });
    }
    Ok(())
}

fn resolve_allowed_hosts() -> HashSet<String> {
    let mut hosts: HashSet<String> = DEFAULT_ALLOWED_HOSTS
        .iter()
        .map(|host| host.to_string())
        .collect();
    if let Ok(value) = env::var(ALLOWED_HOSTS_ENV) {
        for host in value.split(',') {
            let trimmed = host.trim();
            if !trimmed.is_empty() {
                hosts.insert(trimmed.to_string());
            }
        }
    }
    hosts
}

/// Require https and an allowlisted host; plain http is accepted for loopback only.
fn validate_url(url: &Url, allowed_hosts: &HashSet<String>) -> Result<(), FetchError> {
    let host = url
        .host_str()
        .ok_or_else(|| FetchError::InvalidRequest {
            value: url.to_string(),
            reason: "URL is missing a host".to_string(),
        })?;
    let loopback = LOOPBACK_HOSTS.contains(&host);
    if url.scheme() != "https" && !(loopback && url.scheme() == "http") {
        return Err(FetchError::InsecureUrl {
            url: url.to_string(),
        });
    }
    if !loopback && !allowed_hosts.contains(host) {
        return Err(FetchError::HostNotAllowed {
            host: host.to_string(),
        });
    }
    Ok(())
}

fn normalize_sha256(value: &str) -> Result<String, FetchError> {
    let trimmed = value.trim();
    if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FetchError::InvalidSha256(trimmed.to_string()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

fn download_to_path(
    url: &Url,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<u64, FetchError> {
    let mut request = http_client::agent().get(url.as_str());
    if let Some(token) = env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()) {
        request = request.set("Authorization", &format!("Bearer {}", token.trim()));
    }
    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(status, _)) => {
            return Err(FetchError::Http {
                url: url.to_string(),
                status,
            });
        }
        Err(err) => {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            });
        }
    };

    let mut tmp_name = dest.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| FetchError::Io { path, source }
    };
    let written = {
        let mut file = File::create(&tmp).map_err(io_err(&tmp))?;
        let written = http_client::copy_response_to_writer(response, &mut file, MAX_ARTIFACT_BYTES)
            .and_then(|written| file.flush().map(|_| written));
        match written {
            Ok(written) => written,
            Err(source) => {
                let _ = fs::remove_file(&tmp);
                return Err(FetchError::Io { path: tmp, source });
            }
        }
    };
    if let Some(expected) = expected_sha256 {
        let actual = sha256_file(&tmp)?;
        if actual != expected {
            let _ = fs::remove_file(&tmp);
            return Err(FetchError::ChecksumMismatch {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    fs::rename(&tmp, dest).map_err(io_err(dest))?;
    Ok(written)
}

fn sha256_file(path: &Path) -> Result<String, FetchError> {
    let io_err = |source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).map_err(io_err)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
