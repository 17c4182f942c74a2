//! Network transport built on reqwest.

use bytes::Bytes;
use http::{Request, Response};
use tracing::debug;

use crate::buffer::BufferPool;
use crate::error::TransportError;
use crate::transport::{Transport, clone_request, strip_hop_by_hop};

/// [`Transport`] that sends requests over the network.
///
/// Redirects are returned to the caller rather than followed: whoever sits
/// behind a forwarding peer decides what to do with them. Response bodies
/// are read fully, through the configured [`BufferPool`] if any, and
/// hop-by-hop headers are dropped since the body is no longer framed.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    buffers: Option<BufferPool>,
}

impl HttpTransport {
    /// Create a transport with a fresh client that does not follow redirects.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client,
            buffers: None,
        }
    }

    /// Drain response bodies through `pool`.
    pub fn with_buffer_pool(mut self, pool: BufferPool) -> Self {
        self.buffers = Some(pool);
        self
    }

    async fn read_body(&self, mut resp: reqwest::Response) -> Result<Bytes, TransportError> {
        let Some(pool) = &self.buffers else {
            return Ok(resp.bytes().await?);
        };

        let mut buf = pool.get();
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    pool.put(buf);
                    return Err(TransportError::Client(e));
                }
            }
        }

        let body = buf.split().freeze();
        pool.put(buf);
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, req: &Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let outgoing = reqwest::Request::try_from(clone_request(req))?;
        debug!(method = %req.method(), url = %req.uri(), "sending request");

        let resp = self.client.execute(outgoing).await?;
        let status = resp.status();
        let version = resp.version();
        let mut headers = resp.headers().clone();
        let body = self.read_body(resp).await?;

        strip_hop_by_hop(&mut headers);

        let mut out = Response::new(body);
        *out.status_mut() = status;
        *out.version_mut() = version;
        *out.headers_mut() = headers;
        Ok(out)
    }
}
