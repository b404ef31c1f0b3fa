//! Direct-URL archive downloads for tool bundles.

use crate::error::StepError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Local file name for `url`: its last path segment, query stripped.
pub fn archive_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.contains(':'))
        .unwrap_or("download.bin")
        .to_string()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        debug!(path = %partial.display(), error = %e, "Could not remove partial download");
    }
}

/// SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a file, read in chunks.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Download `url` into `dest_dir` and verify it against `expected_sha256`.
///
/// The body is streamed to `<name>.part` and hashed on the way; it is
/// renamed into place only once the digest checks out. A file already
/// present with the pinned digest is reused without any network access.
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    expected_sha256: Option<&str>,
) -> Result<PathBuf, StepError> {
    let path = dest_dir.join(archive_file_name(url));

    if let Some(expected) = expected_sha256 {
        if let Ok(existing) = sha256_file(&path).await {
            if existing.eq_ignore_ascii_case(expected) {
                debug!(path = %path.display(), "Archive already downloaded");
                return Ok(path);
            }
        }
    }

    info!(%url, "Downloading archive");
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| StepError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(StepError::Download {
            url: url.to_string(),
            message: format!("HTTP {}", status),
        });
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| StepError::io(dest_dir, e))?;

    // Stream into a side file; only a verified archive takes the final name.
    let partial = partial_path(&path);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| StepError::io(&partial, e))?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                discard(&partial).await;
                return Err(StepError::Download {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        };
        hasher.update(&chunk);
        size += chunk.len() as u64;
        if let Err(e) = file.write_all(&chunk).await {
            discard(&partial).await;
            return Err(StepError::io(&partial, e));
        }
    }
    file.flush().await.map_err(|e| StepError::io(&partial, e))?;
    drop(file);

    if let Some(expected) = expected_sha256 {
        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            discard(&partial).await;
            return Err(StepError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    tokio::fs::rename(&partial, &path)
        .await
        .map_err(|e| StepError::io(&path, e))?;

    info!(path = %path.display(), size, "Archive downloaded");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            archive_file_name("https://fastdl.mongodb.org/tools/db/tools-100.3.1.deb"),
            "tools-100.3.1.deb"
        );
        assert_eq!(
            archive_file_name("https://host/path/livy.zip?token=abc#frag"),
            "livy.zip"
        );
        assert_eq!(archive_file_name("https://host/dir/"), "dir");
        assert_eq!(archive_file_name("https://"), "download.bin");
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_pinned_archive_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tool.deb"), b"abc").unwrap();

        // Port 9 (discard) is never contacted when the cached file matches.
        let path = download_archive(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/tool.deb",
            dir.path(),
            Some("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"),
        )
        .await
        .expect("cached archive should be reused");

        assert_eq!(path, dir.path().join("tool.deb"));
    }

    /// Serve one HTTP response with `body`, written in small pieces.
    async fn serve_once(body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for piece in body.chunks(3) {
                socket.write_all(piece).await.unwrap();
                socket.flush().await.unwrap();
            }
        });
        format!("http://{}/tools/tool.deb", addr)
    }

    #[tokio::test]
    async fn test_streams_body_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once(b"archive-bytes-in-pieces").await;

        let path = download_archive(
            &reqwest::Client::new(),
            &url,
            dir.path(),
            Some(&sha256_hex(b"archive-bytes-in-pieces")),
        )
        .await
        .unwrap();

        assert_eq!(path, dir.path().join("tool.deb"));
        assert_eq!(std::fs::read(&path).unwrap(), b"archive-bytes-in-pieces");
        assert!(!dir.path().join("tool.deb.part").exists());
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            sha256_hex(b"archive-bytes-in-pieces")
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let url = serve_once(b"tampered").await;

        let err = download_archive(&reqwest::Client::new(), &url, dir.path(), Some(&"0".repeat(64)))
            .await
            .unwrap_err();

        assert!(matches!(err, StepError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("tool.deb").exists());
        assert!(!dir.path().join("tool.deb.part").exists());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = download_archive(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/tool.deb",
            dir.path(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StepError::Download { .. }));
    }
}
