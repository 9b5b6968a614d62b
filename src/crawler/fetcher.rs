use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::Client;
use tokio::fs;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::error::{Result, ScrapeError};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";

/// Network side of the crawler. Non-success statuses are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_document(&self, url: &str, headers: &HeaderMap) -> Result<String>;

    async fn fetch_bytes(&self, url: &str, headers: &HeaderMap, timeout: Duration)
        -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_document(&self, url: &str, headers: &HeaderMap) -> Result<String> {
        let res = self.client.get(url).headers(headers.clone()).send().await?;

        if !res.status().is_success() {
            return Err(ScrapeError::Network(format!("{} returned {}", url, res.status())));
        }

        Ok(res.text().await?)
    }

    async fn fetch_bytes(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let res = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ScrapeError::Network(format!("{} returned {}", url, res.status())));
        }

        Ok(res.bytes().await?.to_vec())
    }
}

/// Downloads a listing's images as `{id}_{n}.{ext}`, 1-based in discovery order.
///
/// Numbering is local to the current run. Files left over from an earlier run
/// with a longer image list are not removed.
pub struct ImageHarvester {
    base: Url,
    dir: PathBuf,
    timeout: Duration,
    delay: Duration,
}

impl ImageHarvester {
    pub fn new(base: Url, dir: impl Into<PathBuf>, timeout: Duration, delay: Duration) -> Self {
        Self { base, dir: dir.into(), timeout, delay }
    }

    /// Returns every discovered URL, resolved against the base, whether or not
    /// its download succeeded. Download failures are dropped here.
    pub async fn harvest<F: Fetcher + ?Sized>(
        &self,
        fetcher: &F,
        headers: &HeaderMap,
        listing_id: &str,
        candidates: &[String],
    ) -> Vec<String> {
        let urls: Vec<String> = candidates.iter().map(|c| self.resolve(c)).collect();

        for (idx, url) in urls.iter().enumerate() {
            let name = image_file_name(listing_id, idx + 1, url);

            match self.download(fetcher, headers, url, &name).await {
                Ok(path) => debug!(url = %url, path = %path.display(), "Saved image"),
                Err(e) => debug!(url = %url, error = %e, "Image skipped"),
            }

            sleep(self.delay).await;
        }

        urls
    }

    fn resolve(&self, href: &str) -> String {
        self.base
            .join(href)
            .map(String::from)
            .unwrap_or_else(|_| href.to_string())
    }

    async fn download<F: Fetcher + ?Sized>(
        &self,
        fetcher: &F,
        headers: &HeaderMap,
        url: &str,
        name: &str,
    ) -> Result<PathBuf> {
        let bytes = fetcher.fetch_bytes(url, headers, self.timeout).await?;

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        fs::write(&path, &bytes).await?;

        Ok(path)
    }
}

pub fn image_file_name(listing_id: &str, seq: usize, url: &str) -> String {
    format!("{}_{}.{}", listing_id, seq, image_extension(url))
}

/// Extension from the URL path, or `jpg` when it isn't a known image type.
pub fn image_extension(url: &str) -> String {
    static EXT: OnceLock<Regex> = OnceLock::new();
    let re = EXT.get_or_init(|| Regex::new(r"\.([A-Za-z0-9]+)$").expect("static regex"));

    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());

    re.captures(&path)
        .map(|c| c[1].to_ascii_lowercase())
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StubFetcher {
        images: HashMap<String, Vec<u8>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch_document(&self, url: &str, _: &HeaderMap) -> Result<String> {
            Err(ScrapeError::Network(format!("unexpected document fetch {url}")))
        }

        async fn fetch_bytes(&self, url: &str, _: &HeaderMap, _: Duration) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::Network(format!("{url} returned 404 Not Found")))
        }
    }

    #[test]
    fn extension_is_whitelisted() {
        assert_eq!(image_extension("https://x.com/a/b.png?w=300"), "png");
        assert_eq!(image_extension("https://x.com/a/b.JPEG"), "jpeg");
        assert_eq!(image_extension("https://x.com/a/b.svg"), "jpg");
        assert_eq!(image_extension("https://x.com/a/photo"), "jpg");
        assert_eq!(image_extension("/rel/c.webp#frag"), "webp");
    }

    #[test]
    fn file_name_is_deterministic() {
        assert_eq!(image_file_name("B200", 1, "https://x.com/i.gif"), "B200_1.gif");
    }

    #[tokio::test]
    async fn failed_downloads_keep_their_url_and_slot() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("images");
        let fetcher = StubFetcher {
            images: HashMap::from([
                ("https://x.com/img/1.png".to_string(), b"one".to_vec()),
                ("https://x.com/img/3.jpg".to_string(), b"three".to_vec()),
            ]),
            calls: Mutex::new(Vec::new()),
        };
        let harvester = ImageHarvester::new(
            Url::parse("https://x.com").unwrap(),
            &dir,
            Duration::from_secs(1),
            Duration::ZERO,
        );

        let candidates = vec![
            "/img/1.png".to_string(),
            "/img/2.jpg".to_string(),
            "https://x.com/img/3.jpg".to_string(),
        ];
        let urls = harvester.harvest(&fetcher, &HeaderMap::new(), "A100", &candidates).await;

        assert_eq!(
            urls,
            vec!["https://x.com/img/1.png", "https://x.com/img/2.jpg", "https://x.com/img/3.jpg"]
        );
        assert_eq!(fetcher.calls.lock().unwrap().len(), 3);
        assert_eq!(std::fs::read(dir.join("A100_1.png")).unwrap(), b"one");
        assert!(!dir.join("A100_2.jpg").exists());
        assert_eq!(std::fs::read(dir.join("A100_3.jpg")).unwrap(), b"three");
    }

    #[tokio::test]
    async fn no_candidates_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("images");
        let fetcher = StubFetcher { images: HashMap::new(), calls: Mutex::new(Vec::new()) };
        let harvester = ImageHarvester::new(
            Url::parse("https://x.com").unwrap(),
            &dir,
            Duration::from_secs(1),
            Duration::ZERO,
        );

        let urls = harvester.harvest(&fetcher, &HeaderMap::new(), "A100", &[]).await;
        assert!(urls.is_empty());
        assert!(!dir.exists());
    }
}
