// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progressive model download with coarse previews.
//!
//! The body is consumed chunk by chunk. At 25%, 50% and 75% of the download
//! the bytes received so far are decoded into whatever complete primitives
//! they hold and handed to the observer as a low-poly preview.

use crate::error::{LoadError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use printview_core::{decode, decode_partial, ModelFormat};
use printview_geometry::{sample_to_budget, Mesh};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Triangle budget for streaming previews
pub const PREVIEW_TRIANGLES: usize = 500;

/// Download percentages at which a preview is attempted
const PREVIEW_CHECKPOINTS: [u8; 3] = [25, 50, 75];

/// No preview before this much of the body has arrived
const PREVIEW_MIN_PERCENT: f64 = 10.0;

/// Upper bound on up-front buffer allocation from a server-supplied length
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Response head plus a streaming body
pub struct TransportResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain GET access to model files
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether bodies arrive incrementally
    fn supports_streaming(&self) -> bool;

    async fn get(&self, url: &str) -> Result<TransportResponse>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    streaming: bool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            streaming: true,
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            streaming: true,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(LoadError::from))
            .boxed();
        Ok(TransportResponse {
            status,
            content_length,
            body,
        })
    }
}

#[derive(Debug, Clone)]
struct MemoryRoute {
    status: u16,
    body: Bytes,
    fail_after_chunks: Option<usize>,
}

/// Serves fixed bodies from memory in fixed-size chunks.
///
/// Routes match on the URL without its query string, so cache-busting
/// parameters do not affect lookup. Unknown URLs answer 404.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    routes: HashMap<String, MemoryRoute>,
    chunk_size: usize,
    streaming: bool,
    announce_length: bool,
    requests: Arc<AtomicUsize>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            chunk_size: 16 * 1024,
            streaming: true,
            announce_length: true,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_route(mut self, url: &str, body: impl Into<Bytes>) -> Self {
        self.routes.insert(
            strip_query(url).to_string(),
            MemoryRoute {
                status: 200,
                body: body.into(),
                fail_after_chunks: None,
            },
        );
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.routes.insert(
            strip_query(url).to_string(),
            MemoryRoute {
                status,
                body: Bytes::new(),
                fail_after_chunks: None,
            },
        );
        self
    }

    /// Serve `body` but break the connection after `chunks` chunks
    pub fn with_broken_route(mut self, url: &str, body: impl Into<Bytes>, chunks: usize) -> Self {
        self.routes.insert(
            strip_query(url).to_string(),
            MemoryRoute {
                status: 200,
                body: body.into(),
                fail_after_chunks: Some(chunks),
            },
        );
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Omit the content length, as chunked responses do
    pub fn without_length(mut self) -> Self {
        self.announce_length = false;
        self
    }

    /// Number of GET requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn get(&self, url: &str) -> Result<TransportResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let Some(route) = self.routes.get(strip_query(url)) else {
            return Ok(TransportResponse {
                status: 404,
                content_length: Some(0),
                body: stream::empty().boxed(),
            });
        };

        let mut chunks: Vec<Result<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < route.body.len() {
            let end = (offset + self.chunk_size).min(route.body.len());
            chunks.push(Ok(route.body.slice(offset..end)));
            offset = end;
        }
        if let Some(limit) = route.fail_after_chunks {
            chunks.truncate(limit);
            chunks.push(Err(LoadError::Network("connection reset".into())));
        }

        Ok(TransportResponse {
            status: route.status,
            content_length: self.announce_length.then_some(route.body.len() as u64),
            body: stream::iter(chunks).boxed(),
        })
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Byte-level download progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub loaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// 0 to 100, when the total is known
    pub percent: Option<f64>,
}

/// Coarse mesh decoded from a partial download, meant for wireframe display
#[derive(Debug, Clone)]
pub struct Preview {
    /// Checkpoint percentage that triggered this preview
    pub checkpoint: u8,
    pub loaded_bytes: u64,
    /// Triangles decoded from the partial buffer before sampling
    pub source_triangles: usize,
    pub mesh: Mesh,
}

/// Receives download events. Both hooks default to doing nothing.
pub trait LoadObserver: Send + Sync {
    fn on_progress(&self, _progress: LoadProgress) {}

    fn on_preview(&self, _preview: Preview) {}
}

impl LoadObserver for () {}

/// A completely downloaded and decoded model
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub format: ModelFormat,
    pub bytes: Vec<u8>,
    pub mesh: Mesh,
}

/// Tracks which preview checkpoints have fired
#[derive(Debug, Default)]
struct Checkpoints {
    next: usize,
}

impl Checkpoints {
    /// Highest not-yet-fired checkpoint reached by `percent`; lower ones it
    /// skipped over are consumed with it
    fn crossed(&mut self, percent: f64) -> Option<u8> {
        if percent <= PREVIEW_MIN_PERCENT {
            return None;
        }
        let mut fired = None;
        while let Some(&checkpoint) = PREVIEW_CHECKPOINTS.get(self.next) {
            if percent < f64::from(checkpoint) {
                break;
            }
            fired = Some(checkpoint);
            self.next += 1;
        }
        fired
    }
}

/// Streams model files through a [`Transport`]
#[derive(Clone)]
pub struct ProgressiveLoader {
    transport: Arc<dyn Transport>,
    streaming: bool,
    preview_triangles: usize,
}

impl ProgressiveLoader {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            streaming: true,
            preview_triangles: PREVIEW_TRIANGLES,
        }
    }

    /// Turning streaming off makes every load a standard one
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_preview_budget(mut self, triangles: usize) -> Self {
        self.preview_triangles = triangles.max(1);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    async fn fetch(&self, url: &str) -> Result<TransportResponse> {
        let response = self.transport.get(url).await?;
        if !response.is_success() {
            return Err(LoadError::HttpStatus {
                status: response.status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Download `url`, reporting progress per chunk and previews at the
    /// checkpoints, then decode the full body off the async runtime.
    pub async fn load_progressively(
        &self,
        url: &str,
        format: ModelFormat,
        observer: &dyn LoadObserver,
    ) -> Result<LoadedAsset> {
        if !self.streaming || !self.transport.supports_streaming() {
            return self.load_standard(url, format, observer).await;
        }

        let TransportResponse {
            content_length,
            mut body,
            ..
        } = self.fetch(url).await?;
        let total = content_length.filter(|&t| t > 0);
        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOC) as usize);
        let mut checkpoints = Checkpoints::default();

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
            let Some(total) = total else {
                continue;
            };

            let loaded = buffer.len() as u64;
            let percent = (loaded as f64 / total as f64 * 100.0).min(100.0);
            observer.on_progress(LoadProgress {
                loaded_bytes: loaded,
                total_bytes: Some(total),
                percent: Some(percent),
            });

            if let Some(checkpoint) = checkpoints.crossed(percent) {
                self.emit_preview(&buffer, format, checkpoint, observer).await;
            }
        }

        debug!(url, bytes = buffer.len(), "Download complete");
        decode_off_thread(buffer, format).await
    }

    /// Download `url` in one piece, reporting only 0% and 100%
    pub async fn load_standard(
        &self,
        url: &str,
        format: ModelFormat,
        observer: &dyn LoadObserver,
    ) -> Result<LoadedAsset> {
        observer.on_progress(LoadProgress {
            loaded_bytes: 0,
            total_bytes: None,
            percent: Some(0.0),
        });

        let response = self.fetch(url).await?;
        let mut buffer = Vec::new();
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let loaded = buffer.len() as u64;
        observer.on_progress(LoadProgress {
            loaded_bytes: loaded,
            total_bytes: Some(loaded),
            percent: Some(100.0),
        });

        decode_off_thread(buffer, format).await
    }

    async fn emit_preview(
        &self,
        buffer: &[u8],
        format: ModelFormat,
        checkpoint: u8,
        observer: &dyn LoadObserver,
    ) {
        let partial = buffer.to_vec();
        let budget = self.preview_triangles;
        let preview = tokio::task::spawn_blocking(move || {
            let mesh = Mesh::from(decode_partial(&partial, format)?);
            let source_triangles = mesh.triangle_count();
            Ok::<_, LoadError>((source_triangles, sample_to_budget(&mesh, budget)))
        })
        .await;

        match preview {
            Ok(Ok((source_triangles, mesh))) => {
                debug!(checkpoint, triangles = mesh.triangle_count(), "Preview ready");
                observer.on_preview(Preview {
                    checkpoint,
                    loaded_bytes: buffer.len() as u64,
                    source_triangles,
                    mesh,
                });
            }
            Ok(Err(e)) => warn!(checkpoint, error = %e, "Preview decode failed"),
            Err(e) => warn!(checkpoint, error = %e, "Preview task failed"),
        }
    }
}

async fn decode_off_thread(bytes: Vec<u8>, format: ModelFormat) -> Result<LoadedAsset> {
    tokio::task::spawn_blocking(move || {
        let mesh = Mesh::from(decode(&bytes, format)?);
        Ok::<_, LoadError>(LoadedAsset { format, bytes, mesh })
    })
    .await?
}

/// Base for resolving relative URLs; never appears in output
const RELATIVE_BASE: &str = "http://printview.invalid/";

/// Append `v`, `id` and `t` query parameters to a model URL, replacing any
/// already present. Relative URLs stay relative.
pub fn cache_busting_url(url: &str, model_id: &str, version: &str, now_ms: u64) -> String {
    let (mut parsed, relative) = match Url::parse(url) {
        Ok(parsed) => (parsed, false),
        Err(_) => match Url::parse(RELATIVE_BASE).and_then(|base| base.join(url)) {
            Ok(parsed) => (parsed, true),
            Err(_) => return url.to_string(),
        },
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !matches!(key.as_ref(), "v" | "id" | "t"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("v", version)
        .append_pair("id", model_id)
        .append_pair("t", &now_ms.to_string());

    if !relative {
        return parsed.into();
    }

    let mut out = strip_query(url).to_string();
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
