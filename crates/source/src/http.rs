use crate::error::{ErrorKind, Result};
use crate::{DeviceListing, SnapshotSource};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

/// The storage API.
///
/// - `GET {base}/storages` returns the device catalog as a JSON array.
/// - `GET {base}/catalog/{location}` returns one location's snapshot.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

impl HttpSource {
    /// `timeout` bounds each whole request, body included; snapshots for
    /// large locations take a while.
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("archivist/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Network(base.to_string()))?;
        Ok(Self { client, base })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .ok()
            .ok_or_raise(|| ErrorKind::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: &Url) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .or_raise(|| ErrorKind::Network(url.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn write_body(response: &mut Response, file: &mut File, url: &Url, dest: &Path) -> Result<u64> {
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.or_raise(|| ErrorKind::Network(url.to_string()))? {
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
        Ok(written)
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    #[instrument(skip(self))]
    async fn devices(&self) -> Result<Vec<DeviceListing>> {
        let url = self.endpoint(&["storages"])?;
        let devices: Vec<DeviceListing> = self
            .get(&url)
            .await?
            .json()
            .await
            .or_raise(|| ErrorKind::Decode(url.to_string()))?;
        debug!(devices = devices.len(), "Device catalog fetched");
        Ok(devices)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download(&self, location: &str, dest: &Path) -> Result<u64> {
        let url = self.endpoint(&["catalog", location])?;
        let mut response = self.get(&url).await?;
        let mut file = File::create(dest).await.or_raise(|| ErrorKind::Io(dest.to_path_buf()))?;
        match Self::write_body(&mut response, &mut file, &url, dest).await {
            Ok(written) => {
                debug!(bytes = written, "Snapshot downloaded");
                Ok(written)
            },
            Err(e) => {
                drop(file);
                _ = tokio::fs::remove_file(dest).await;
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_inventory::DeviceStatus;
    use rstest::rstest;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve canned responses keyed by request path until the test ends.
    async fn serve(routes: Vec<(&'static str, u16, String)>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = routes
                        .iter()
                        .find(|(p, ..)| *p == path)
                        .map(|(_, s, b)| (*s, b.clone()))
                        .unwrap_or((404, String::new()));
                    let response = format!(
                        "HTTP/1.1 {status} Canned\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    _ = socket.write_all(response.as_bytes()).await;
                    _ = socket.shutdown().await;
                });
            }
        });
        Url::parse(&format!("http://{addr}/api")).unwrap()
    }

    fn source(base: Url) -> HttpSource {
        HttpSource::new(base, Duration::from_secs(5)).unwrap()
    }

    #[rstest]
    #[case("http://storage.local/api", &["storages"], "http://storage.local/api/storages")]
    #[case("http://storage.local/api/", &["storages"], "http://storage.local/api/storages")]
    #[case("http://storage.local/", &["catalog", "us ny"], "http://storage.local/catalog/us%20ny")]
    #[case("http://storage.local/api/", &["catalog", "a/b"], "http://storage.local/api/catalog/a%2Fb")]
    fn test_endpoint(#[case] base: &str, #[case] segments: &[&str], #[case] expected: &str) {
        let source = source(Url::parse(base).unwrap());
        assert_eq!(source.endpoint(segments).unwrap().as_str(), expected);
    }

    #[tokio::test]
    async fn test_devices() {
        let body = r#"[{"id":"il-merkaz","country":"il","location":"merkaz","status":"ONLINE","access":"public"}]"#;
        let base = serve(vec![("/api/storages", 200, body.to_string())]).await;
        let devices = source(base).devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "il-merkaz");
        assert_eq!(devices[0].status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn test_devices_bad_body() {
        let base = serve(vec![("/api/storages", 200, r#"{"not":"a list"}"#.to_string())]).await;
        let err = source(base).devices().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Decode(_)));
    }

    #[tokio::test]
    async fn test_download() {
        let body = "[\"/a\",\"da39a3ee5e6b4b0d3255bfef95601890afd80709\",1,2]\n".to_string();
        let base = serve(vec![("/api/catalog/il-merkaz", 200, body.clone())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index.txt");
        let written = source(base).download("il-merkaz", &dest).await.unwrap();
        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let base = serve(vec![("/api/catalog/broken", 500, "oops".to_string())]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index.txt");
        let err = source(base).download("broken", &dest).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Status { status: 500, .. }));
        assert!(err.is_retryable());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_unreachable() {
        // Bind then drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        let err = source(base).devices().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Network(_)));
    }
}
