//! Image download with dimension probing.

use std::io::Cursor;

use async_trait::async_trait;
use image::ImageReader;
use tracing::debug;

use super::http_client::HttpClient;
use super::retry::{with_backoff, RetryPolicy};
use super::{FetchError, ImageFetcher};

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// A downloaded image ready for admission checks.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl FetchedImage {
    /// Decode pixel dimensions from the image header.
    pub fn from_bytes(bytes: Vec<u8>, content_type: Option<&str>) -> Result<Self, FetchError> {
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| FetchError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let media_type = detect_media_type(&bytes, content_type);
        Ok(Self {
            bytes,
            media_type,
            width,
            height,
        })
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn shortest_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// Sniff the media type from magic bytes, falling back to the response header.
fn detect_media_type(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some(kind) = infer::get(bytes) {
        if kind.mime_type().starts_with("image/") {
            return kind.mime_type().to_string();
        }
    }
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| ct.starts_with("image/"))
        .unwrap_or(DEFAULT_MEDIA_TYPE)
        .to_string()
}

/// Downloads images through the shared [`HttpClient`].
pub struct HttpImageFetcher {
    http: HttpClient,
    retry: RetryPolicy,
}

impl HttpImageFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            retry: RetryPolicy::page_fetch(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn download(&self, image_url: &str) -> Result<FetchedImage, FetchError> {
        let response = self
            .http
            .get(image_url)
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.is_success() {
            return Err(FetchError::Http {
                status: response.status.as_u16(),
            });
        }

        let content_type = response.content_type().map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        FetchedImage::from_bytes(bytes, content_type.as_deref())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, image_url: &str) -> Result<FetchedImage, FetchError> {
        let label = format!("download {}", image_url);
        let image = with_backoff(&self.retry, &label, || self.download(image_url)).await?;
        debug!(
            "Downloaded {} ({} bytes, {}x{}, {})",
            image_url,
            image.byte_len(),
            image.width,
            image.height,
            image.media_type
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_from_bytes_reads_dimensions() {
        let image = FetchedImage::from_bytes(png(320, 200), None).unwrap();
        assert_eq!((image.width, image.height), (320, 200));
        assert_eq!(image.media_type, "image/png");
        assert_eq!(image.longest_side(), 320);
        assert_eq!(image.shortest_side(), 200);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let err = FetchedImage::from_bytes(b"not an image".to_vec(), Some("image/png")).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_media_type_falls_back_to_header() {
        assert_eq!(
            detect_media_type(b"????", Some("image/webp; charset=binary")),
            "image/webp"
        );
        assert_eq!(detect_media_type(b"????", Some("text/html")), "image/jpeg");
        assert_eq!(detect_media_type(b"????", None), "image/jpeg");
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/pic.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(png(150, 120))
            .create_async()
            .await;

        let fetcher = HttpImageFetcher::new(HttpClient::new(Duration::from_secs(5), Duration::ZERO));
        let image = fetcher
            .fetch(&format!("{}/pic.png", server.url()))
            .await
            .unwrap();
        assert_eq!((image.width, image.height), (150, 120));
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone.jpg")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = HttpImageFetcher::new(HttpClient::new(Duration::from_secs(5), Duration::ZERO))
            .with_retry_policy(RetryPolicy::immediate(3));
        let err = fetcher
            .fetch(&format!("{}/gone.jpg", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404 }));
        mock.assert_async().await;
    }
}
