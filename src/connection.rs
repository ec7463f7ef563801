use crate::error::{Result, SynergyError};
use crate::protocol::{Reply, Request};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_CHUNK: usize = 4096;

/// One socket to the controller
///
/// Replies are unterminated JSON documents, so inbound bytes are buffered and
/// decoded one document at a time. Bytes after a matched reply stay buffered
/// for the next request on this connection.
pub(crate) struct Connection<S = TcpStream> {
    stream: S,
    buffer: Vec<u8>,
}

impl Connection<TcpStream> {
    /// Open a TCP connection, enabling keep-alive on a best-effort basis
    pub async fn open(address: &str, keepalive: Option<Duration>) -> Result<Self> {
        tracing::info!("Connecting to {}", address);
        let stream = TcpStream::connect(address).await?;

        if let Some(idle) = keepalive {
            let params = socket2::TcpKeepalive::new().with_time(idle);
            if let Err(e) = socket2::SockRef::from(&stream).set_tcp_keepalive(&params) {
                tracing::warn!("Failed to enable keep-alive on {}: {}", address, e);
            }
        }

        Ok(Self::new(stream))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Write a request and wait for the reply carrying the same id
    pub async fn round_trip(&mut self, request: &Request) -> Result<Reply> {
        let wire = request.to_wire()?;
        tracing::debug!("Sending: {}", String::from_utf8_lossy(&wire));

        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;

        self.read_reply(request.id).await
    }

    /// Read documents until one matches `id`
    ///
    /// Documents with another id (or none) are skipped; a document that does
    /// not parse fails the request.
    async fn read_reply(&mut self, id: u64) -> Result<Reply> {
        loop {
            while let Some(doc) = self.next_document()? {
                tracing::debug!("Received: {}", doc);
                match Reply::peek_id(&doc)? {
                    Some(reply_id) if reply_id == id => return Reply::from_document(doc),
                    other => {
                        tracing::warn!("Ignoring reply with id {:?} while waiting for {}", other, id);
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(SynergyError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pop one complete document off the buffer, if there is one
    fn next_document(&mut self) -> Result<Option<Value>> {
        let mut docs = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match docs.next() {
            Some(Ok(doc)) => {
                let consumed = docs.byte_offset();
                self.buffer.drain(..consumed);
                Ok(Some(doc))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e.into()),
            None => {
                self.buffer.clear();
                Ok(None)
            }
        }
    }
}
