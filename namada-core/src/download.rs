//! Verified downloads.
//!
//! Artifacts fetched from the network are checked against their published SHA-256 before
//! anything executes them.

use crate::errors::SetupError;
use anyhow::{anyhow, Context, Result};
use namada_hal::SystemHal;
use sha2::{Digest, Sha256};

/// Rust target triple and release-asset arch for the running host.
pub fn host_arch() -> Result<(&'static str, &'static str)> {
    match std::env::consts::ARCH {
        "x86_64" => Ok(("x86_64-unknown-linux-gnu", "amd64")),
        "aarch64" => Ok(("aarch64-unknown-linux-gnu", "arm64")),
        other => Err(SetupError::UnsupportedArch(other.to_string()).into()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_sha256(token: &str) -> bool {
    token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Find the digest for `file_name` in a `sha256sum`-style listing.
///
/// A single bare digest is accepted as well (rustup's `.sha256` files).
pub fn parse_checksum(listing: &str, file_name: &str) -> Option<String> {
    for line in listing.lines() {
        let mut parts = line.split_whitespace();
        let Some(digest) = parts.next() else {
            continue;
        };
        if !is_sha256(digest) {
            continue;
        }
        match parts.next() {
            None => return Some(digest.to_ascii_lowercase()),
            Some(name) => {
                let name = name.trim_start_matches('*');
                if name == file_name || name.ends_with(&format!("/{file_name}")) {
                    return Some(digest.to_ascii_lowercase());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDownload {
    pub url: String,
    pub checksum_url: String,
    pub file_name: String,
}

impl VerifiedDownload {
    pub fn rustup_init(dist_server: &str) -> Result<Self> {
        let (triple, _) = host_arch()?;
        let url = format!(
            "{}/rustup/dist/{triple}/rustup-init",
            dist_server.trim_end_matches('/')
        );
        Ok(Self {
            checksum_url: format!("{url}.sha256"),
            url,
            file_name: "rustup-init".to_string(),
        })
    }

    pub fn cometbft(version: &str) -> Result<Self> {
        let (_, arch) = host_arch()?;
        let base = format!("https://github.com/cometbft/cometbft/releases/download/v{version}");
        let file_name = format!("cometbft_{version}_linux_{arch}.tar.gz");
        Ok(Self {
            url: format!("{base}/{file_name}"),
            checksum_url: format!("{base}/cometbft_{version}_checksums.txt"),
            file_name,
        })
    }

    /// Fetch the artifact and its digest; fail unless they agree.
    pub fn fetch(&self, hal: &dyn SystemHal) -> Result<Vec<u8>> {
        log::info!("Downloading {}", self.url);
        let listing = hal
            .fetch(&self.checksum_url)
            .with_context(|| format!("Failed to fetch checksum for {}", self.file_name))?;
        let listing = String::from_utf8_lossy(&listing);
        let expected = parse_checksum(&listing, &self.file_name).ok_or_else(|| {
            anyhow!(
                "{} does not list a SHA-256 for {}",
                self.checksum_url,
                self.file_name
            )
        })?;
        let body = hal
            .fetch(&self.url)
            .with_context(|| format!("Failed to download {}", self.url))?;
        let actual = sha256_hex(&body);
        if actual != expected {
            return Err(SetupError::ChecksumMismatch {
                name: self.file_name.clone(),
                expected,
                actual,
            }
            .into());
        }
        log::info!("Verified {} (sha256 {})", self.file_name, actual);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use namada_hal::FakeHal;

    const EMPTY_SHA: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn digest_matches_known_vector() {
        assert_eq!(sha256_hex(b""), EMPTY_SHA);
    }

    #[test]
    fn checksum_listing_formats() {
        let listing = format!(
            "{}  cometbft_0.37.15_linux_arm64.tar.gz\n{EMPTY_SHA}  cometbft_0.37.15_linux_amd64.tar.gz\n",
            "a".repeat(64)
        );
        assert_eq!(
            parse_checksum(&listing, "cometbft_0.37.15_linux_amd64.tar.gz").as_deref(),
            Some(EMPTY_SHA)
        );
        assert_eq!(parse_checksum(&listing, "missing.tar.gz"), None);

        let rustup = format!("{EMPTY_SHA} *target/x86_64-unknown-linux-gnu/release/rustup-init\n");
        assert_eq!(parse_checksum(&rustup, "rustup-init").as_deref(), Some(EMPTY_SHA));
        assert_eq!(parse_checksum(EMPTY_SHA, "rustup-init").as_deref(), Some(EMPTY_SHA));
        assert_eq!(parse_checksum("not-a-digest rustup-init", "rustup-init"), None);
    }

    fn download() -> VerifiedDownload {
        VerifiedDownload {
            url: "https://example.invalid/tool".into(),
            checksum_url: "https://example.invalid/tool.sha256".into(),
            file_name: "tool".into(),
        }
    }

    #[test]
    fn verified_body_is_returned() {
        let hal = FakeHal::ubuntu();
        hal.serve_download("https://example.invalid/tool", b"payload".to_vec());
        hal.serve_download(
            "https://example.invalid/tool.sha256",
            format!("{}  tool\n", sha256_hex(b"payload")),
        );
        assert_eq!(download().fetch(&hal).unwrap(), b"payload");
    }

    #[test]
    fn tampered_body_is_rejected() {
        let hal = FakeHal::ubuntu();
        hal.serve_download("https://example.invalid/tool", b"tampered".to_vec());
        hal.serve_download(
            "https://example.invalid/tool.sha256",
            format!("{}  tool\n", sha256_hex(b"payload")),
        );
        let err = download().fetch(&hal).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SetupError>(),
            Some(SetupError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn offline_host_fails_cleanly() {
        let hal = FakeHal::ubuntu();
        hal.set_offline(true);
        assert!(download().fetch(&hal).is_err());
    }

    #[test]
    fn rustup_url_uses_dist_server() {
        let d = VerifiedDownload::rustup_init("https://static.rust-lang.org/").unwrap();
        assert!(d.url.starts_with("https://static.rust-lang.org/rustup/dist/"));
        assert!(d.url.ends_with("/rustup-init"));
        assert_eq!(d.checksum_url, format!("{}.sha256", d.url));
    }
}
