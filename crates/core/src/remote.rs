//! HTTP client for the image processing service.
//!
//! The service keeps uploaded originals under a generated filename and
//! exposes one endpoint per transform under `/api/v1`. Transform endpoints
//! answer with encoded image bytes, everything else with JSON.
//!
//! Only the idempotent `list` query is retried. Writes and transforms fail
//! on the first error so the session can keep its prior state.

use crate::compositor::Fill;
use crate::config::Config;
use crate::encoder;
use crate::error::{AppError, Result};
use crate::filters::Filter;
use crate::presets::Rgb;
use crate::raster::RasterImage;
use crate::transform::{self, ImageTransform, Operation, TransformInput};
use crate::upload::Upload;
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use url::Url;

/// Reply to a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    /// Server-side name used by every later request.
    pub filename: String,
    pub original_name: String,
    pub size: u64,
}

/// One stored upload as reported by `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub filename: String,
    pub size: u64,
    pub size_mb: f64,
}

#[derive(Deserialize)]
struct ListResponse {
    images: Vec<ImageInfo>,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: String,
}

/// Capped exponential backoff for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based):
    /// `min(base * 2^attempt, max)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
}

impl RemoteClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            timeout: config.timeout,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("api/v1/{path}"))
            .map_err(|e| AppError::config(format!("Invalid endpoint '{path}': {e}")))
    }

    fn request_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout(self.timeout)
        } else {
            AppError::remote(format!("Request failed: {err}"))
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| self.request_error(e))?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        serde_json::from_slice(&body)
            .map_err(|e| AppError::remote(format!("Unexpected response body: {e}")))
    }

    async fn send_bytes(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        Ok(body.to_vec())
    }

    /// Stores the original file on the service.
    pub async fn upload(&self, upload: &Upload) -> Result<UploadResponse> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.name.clone())
            .mime_str(&upload.mime)
            .map_err(|_| AppError::UnsupportedType(upload.mime.clone()))?;
        let form = Form::new().part("file", part);

        let url = self.endpoint("upload")?;
        log::debug!("POST {url} ({} bytes)", upload.size());
        self.send_json(self.client.post(url).multipart(form)).await
    }

    /// Runs `filter` on the stored original and returns the encoded result.
    ///
    /// Parameters are checked locally first so out-of-range values never
    /// reach the network.
    pub async fn transform(&self, filename: &str, filter: &Filter) -> Result<Vec<u8>> {
        filter.validate()?;
        let url = self.endpoint(filter.name())?;
        log::debug!("POST {url} ({filter})");
        self.send_bytes(self.client.post(url).json(&filter_body(filename, filter)))
            .await
    }

    /// Replaces the background of the stored original with `color`.
    pub async fn change_background(&self, filename: &str, color: Rgb) -> Result<Vec<u8>> {
        let url = self.endpoint("change-background")?;
        let color = color.to_hex();
        log::debug!("GET {url} ({filename} on {color})");
        let request = self
            .client
            .get(url)
            .query(&[("filename", filename), ("background_color", color.as_str())]);
        self.send_bytes(request).await
    }

    /// Lists stored uploads, retrying server and network failures.
    pub async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let url = self.endpoint("list")?;
        let mut attempt = 0;
        loop {
            log::debug!("GET {url} (attempt {})", attempt + 1);
            let result: Result<ListResponse> = self.send_json(self.client.get(url.clone())).await;
            match result {
                Ok(list) => return Ok(list.images),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    log::warn!("list_images: {err}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Deletes a stored upload and returns the service's message.
    pub async fn delete_image(&self, filename: &str) -> Result<String> {
        let mut url = self.endpoint("delete/")?;
        url.path_segments_mut()
            .map_err(|_| AppError::config("API URL cannot be a base"))?
            .pop_if_empty()
            .push(filename);
        log::debug!("DELETE {url}");
        let reply: MessageResponse = self.send_json(self.client.delete(url)).await?;
        Ok(reply.message)
    }
}

/// JSON body for a transform endpoint.
fn filter_body(filename: &str, filter: &Filter) -> Value {
    match *filter {
        Filter::Brightness(factor)
        | Filter::Contrast(factor)
        | Filter::Saturation(factor)
        | Filter::Sharpen(factor) => json!({ "filename": filename, "factor": factor }),
        Filter::Blur(radius) => json!({ "filename": filename, "radius": radius }),
        Filter::Grayscale | Filter::Sepia => json!({ "filename": filename }),
        Filter::Resize { width, height } => {
            json!({ "filename": filename, "width": width, "height": height })
        }
        Filter::Crop {
            x,
            y,
            width,
            height,
        } => json!({
            "filename": filename,
            "x": x,
            "y": y,
            "width": width,
            "height": height,
        }),
        Filter::Rotate(angle) => json!({ "filename": filename, "angle": angle }),
        Filter::Flip(direction) => {
            json!({ "filename": filename, "direction": direction.as_str() })
        }
    }
}

/// Maps non-success statuses to errors. 4xx keeps the service's `detail`
/// text, everything else becomes a server failure.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

    if status.is_client_error() {
        Err(AppError::Remote {
            status: status.as_u16(),
            detail,
        })
    } else {
        Err(AppError::remote(format!("HTTP {}: {detail}", status.as_u16())))
    }
}

/// `detail` from a `{"detail": ...}` body, or the raw text.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(body.to_string()),
        },
        _ => Some(body.to_string()),
    }
}

/// [`ImageTransform`] backed by the remote service.
///
/// The service always works from the stored original, so results do not
/// build on earlier local edits. Size and background operations go through
/// `change-background` and are then fitted locally to the exact canvas.
pub struct RemoteTransform {
    client: RemoteClient,
}

impl RemoteTransform {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    async fn run(&self, filename: &str, op: &Operation) -> Result<RasterImage> {
        match *op {
            Operation::Filter(filter) => {
                let bytes = self.client.transform(filename, &filter).await?;
                encoder::decode(&bytes)
            }
            Operation::Fit { size, background }
            | Operation::RemoveBackground { size, background } => {
                let bytes = self
                    .client
                    .change_background(filename, background.rgb())
                    .await?;
                let raster = encoder::decode(&bytes)?;
                transform::fit(&raster, size, Fill::Solid(background.rgb()))
            }
        }
    }
}

impl ImageTransform for RemoteTransform {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn prepare<'a>(&'a self, upload: &'a Upload) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let reply = self.client.upload(upload).await?;
            log::info!(
                "Uploaded {} as {} ({} bytes)",
                reply.original_name,
                reply.filename,
                reply.size
            );
            Ok(Some(reply.filename))
        })
    }

    fn apply<'a>(
        &'a self,
        input: TransformInput<'a>,
        op: &'a Operation,
    ) -> BoxFuture<'a, Result<RasterImage>> {
        Box::pin(async move {
            let filename = input.remote_name.ok_or(AppError::NotUploaded)?;
            let start = Instant::now();
            let result = self.run(filename, op).await?;
            log::info!("{op} completed remotely in {:.2?}", start.elapsed());
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::OutputFormat;
    use crate::filters::FlipDirection;
    use crate::presets::{BackgroundColor, PhotoSize};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct Canned {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    }

    fn json_reply(status: u16, body: &str) -> Canned {
        Canned {
            status,
            content_type: "application/json",
            body: body.as_bytes().to_vec(),
        }
    }

    fn png_reply(image: &RasterImage) -> Canned {
        Canned {
            status: 200,
            content_type: "image/png",
            body: encoder::encode(image, OutputFormat::Png).unwrap(),
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Reads one request and returns it as lossy text.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let done = match length {
                Some(len) => buf.len() >= end + 4 + len,
                None if head.contains("transfer-encoding: chunked") => {
                    find(&buf[end..], b"0\r\n\r\n").is_some()
                }
                None => true,
            };
            if done {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serves `replies` in order, one connection each, and records every
    /// request it saw.
    async fn serve(replies: Vec<Canned>) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        tokio::spawn(async move {
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);
                let head = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    reply.status,
                    reply.content_type,
                    reply.body.len()
                );
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.write_all(&reply.body).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (Url::parse(&format!("http://{addr}/")).unwrap(), seen)
    }

    fn client_for(url: Url) -> RemoteClient {
        let mut config = Config::from_lookup(|_| None).unwrap();
        config.api_url = url;
        config.timeout = Duration::from_secs(5);
        RemoteClient::new(&config).unwrap().with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        })
    }

    /// A base URL nothing listens on.
    async fn closed_url() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(policy.delay(40), Duration::from_secs(30));
    }

    #[test]
    fn error_detail_prefers_json_detail() {
        assert_eq!(
            error_detail(r#"{"detail":"Image not found"}"#).as_deref(),
            Some("Image not found")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"msg":"field required"}]}"#).as_deref(),
            Some(r#"[{"msg":"field required"}]"#)
        );
        assert_eq!(error_detail("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(error_detail("  "), None);
    }

    #[test]
    fn transform_bodies_match_endpoint_parameters() {
        assert_eq!(
            filter_body("a.jpg", &Filter::Blur(4)),
            json!({ "filename": "a.jpg", "radius": 4 })
        );
        assert_eq!(
            filter_body("a.jpg", &Filter::Flip(FlipDirection::Vertical)),
            json!({ "filename": "a.jpg", "direction": "vertical" })
        );
        assert_eq!(
            filter_body("a.jpg", &Filter::Crop { x: 1, y: 2, width: 3, height: 4 }),
            json!({ "filename": "a.jpg", "x": 1, "y": 2, "width": 3, "height": 4 })
        );
        assert_eq!(filter_body("a.jpg", &Filter::Sepia), json!({ "filename": "a.jpg" }));
    }

    #[tokio::test]
    async fn client_error_detail_is_surfaced_verbatim() {
        let (url, seen) = serve(vec![json_reply(404, r#"{"detail":"Image not found"}"#)]).await;
        let err = client_for(url).delete_image("missing.jpg").await.unwrap_err();

        match err {
            AppError::Remote { status, detail } => {
                assert_eq!(status, 404);
                assert_eq!(detail, "Image not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(seen.lock().unwrap()[0].starts_with("DELETE /api/v1/delete/missing.jpg "));
    }

    #[tokio::test]
    async fn list_retries_server_errors() {
        let (url, seen) = serve(vec![
            json_reply(500, r#"{"detail":"disk on fire"}"#),
            json_reply(
                200,
                r#"{"images":[{"filename":"a.jpg","size":2048,"size_mb":0.0}]}"#,
            ),
        ])
        .await;

        let images = client_for(url).list_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "a.jpg");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_never_retries_client_errors() {
        let (url, seen) = serve(vec![
            json_reply(403, r#"{"detail":"Forbidden"}"#),
            json_reply(200, r#"{"images":[]}"#),
        ])
        .await;

        let err = client_for(url).list_images().await.unwrap_err();
        assert!(matches!(err, AppError::Remote { status: 403, .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_gives_up_after_max_retries() {
        let replies = (0..4).map(|_| json_reply(503, "unavailable")).collect();
        let (url, seen) = serve(replies).await;

        let err = client_for(url).list_images().await.unwrap_err();
        assert!(matches!(err, AppError::RemoteServer(_)));
        assert_eq!(err.user_message(), "The image service is unavailable. Please try again.");
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn writes_are_not_retried() {
        let (url, seen) = serve(vec![json_reply(500, "boom"), json_reply(200, "{}")]).await;
        let err = client_for(url)
            .transform("a.jpg", &Filter::Grayscale)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let mut config = Config::from_lookup(|_| None).unwrap();
        config.api_url = Url::parse(&format!("http://{addr}/")).unwrap();
        config.timeout = Duration::from_millis(200);
        let client = RemoteClient::new(&config).unwrap();

        let err = client.delete_image("a.jpg").await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn upload_returns_server_filename() {
        let (url, seen) = serve(vec![json_reply(
            200,
            r#"{"message":"Image uploaded successfully","filename":"f00d.png","original_name":"me.png","size":3}"#,
        )])
        .await;
        let remote = RemoteTransform::new(client_for(url));
        let upload = Upload::new("me.png", "image/png", vec![1, 2, 3]);

        let name = remote.prepare(&upload).await.unwrap();
        assert_eq!(name.as_deref(), Some("f00d.png"));

        let request = seen.lock().unwrap()[0].clone();
        assert!(request.starts_with("POST /api/v1/upload "));
        assert!(request.contains("filename=\"me.png\""));
    }

    #[tokio::test]
    async fn filter_posts_json_and_decodes_reply() {
        let reply = RasterImage::filled(3, 2, [9, 8, 7, 255]);
        let (url, seen) = serve(vec![png_reply(&reply)]).await;
        let remote = RemoteTransform::new(client_for(url));
        let base = RasterImage::filled(1, 1, [0, 0, 0, 255]);
        let input = TransformInput {
            base: &base,
            remote_name: Some("f00d.png"),
        };

        let op = Operation::Filter(Filter::Brightness(1.5));
        let out = remote.apply(input, &op).await.unwrap();
        assert_eq!(out, reply);

        let request = seen.lock().unwrap()[0].clone();
        assert!(request.starts_with("POST /api/v1/brightness "));
        assert!(request.contains(r#""factor":1.5"#));
        assert!(request.contains(r#""filename":"f00d.png""#));
    }

    #[tokio::test]
    async fn fit_uses_change_background_then_exact_size() {
        let reply = RasterImage::filled(40, 30, [200, 10, 10, 255]);
        let (url, seen) = serve(vec![png_reply(&reply)]).await;
        let remote = RemoteTransform::new(client_for(url));
        let base = RasterImage::filled(1, 1, [0, 0, 0, 255]);
        let input = TransformInput {
            base: &base,
            remote_name: Some("f00d.png"),
        };

        let op = Operation::Fit {
            size: PhotoSize::UkVisa,
            background: BackgroundColor::LightBlue,
        };
        let out = remote.apply(input, &op).await.unwrap();
        assert_eq!(out.dimensions(), (413, 531));

        let request = seen.lock().unwrap()[0].clone();
        assert!(request.starts_with(
            "GET /api/v1/change-background?filename=f00d.png&background_color=%23dbeafe "
        ));
    }

    #[tokio::test]
    async fn remote_edit_requires_upload() {
        let remote = RemoteTransform::new(client_for(closed_url().await));
        let base = RasterImage::filled(2, 2, [0, 0, 0, 255]);
        let input = TransformInput {
            base: &base,
            remote_name: None,
        };
        let err = remote
            .apply(input, &Operation::Filter(Filter::Sepia))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotUploaded));
    }

    #[tokio::test]
    async fn out_of_range_filter_never_reaches_network() {
        let client = client_for(closed_url().await);
        let err = client
            .transform("a.jpg", &Filter::Brightness(5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_server_failure() {
        let client = client_for(closed_url().await).with_retry(RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        });
        let err = client.list_images().await.unwrap_err();
        assert!(matches!(err, AppError::RemoteServer(_)));
    }
}
