//! Raw-deflate wrapping of a duplex stream (COMPRESS=DEFLATE, RFC 4978).
//!
//! Both directions run raw deflate streams without zlib headers. Writes
//! are buffered compressed; a flush performs a deflate sync flush so the
//! peer can decode everything sent so far — IMAP is line-interactive and
//! must not sit on partial blocks.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const CHUNK: usize = 8 * 1024;

pub struct DeflateStream<S> {
    inner: S,
    deflate: Compress,
    inflate: Decompress,
    /// Compressed input not yet fed to the decompressor.
    read_raw: Vec<u8>,
    /// Decompressed output not yet handed to the caller.
    read_plain: Vec<u8>,
    read_plain_pos: usize,
    /// Compressed output not yet written to the inner stream.
    write_out: Vec<u8>,
    write_out_pos: usize,
    needs_sync: bool,
}

impl<S> DeflateStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_buffered(inner, Vec::new())
    }

    /// Bytes already read from the socket before the upgrade belong to
    /// the compressed stream; feed them to the decompressor.
    pub fn with_buffered(inner: S, buffered: Vec<u8>) -> Self {
        Self {
            inner,
            deflate: Compress::new(Compression::default(), false),
            inflate: Decompress::new(false),
            read_raw: buffered,
            read_plain: Vec::new(),
            read_plain_pos: 0,
            write_out: Vec::new(),
            write_out_pos: 0,
            needs_sync: false,
        }
    }
}

impl<S: AsyncRead + Unpin> DeflateStream<S> {
    fn inflate_available(&mut self) -> io::Result<()> {
        if self.read_raw.is_empty() {
            return Ok(());
        }
        self.read_plain.reserve(CHUNK);

        let before_in = self.inflate.total_in();
        self.inflate
            .decompress_vec(&self.read_raw, &mut self.read_plain, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let consumed = (self.inflate.total_in() - before_in) as usize;
        self.read_raw.drain(..consumed);
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeflateStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            // Serve already-decompressed bytes first.
            if this.read_plain_pos < this.read_plain.len() {
                let available = &this.read_plain[this.read_plain_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                this.read_plain_pos += n;
                if this.read_plain_pos == this.read_plain.len() {
                    this.read_plain.clear();
                    this.read_plain_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            // Try to make progress on buffered compressed input; no
            // output means the decompressor is starved for input.
            this.inflate_available()?;
            if !this.read_plain.is_empty() {
                continue;
            }

            let mut tmp = [0u8; CHUNK];
            let mut tmp_buf = ReadBuf::new(&mut tmp);
            match Pin::new(&mut this.inner).poll_read(cx, &mut tmp_buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(())) => {
                    let filled = tmp_buf.filled();
                    if filled.is_empty() {
                        // EOF below the compression layer.
                        return Poll::Ready(Ok(()));
                    }
                    this.read_raw.extend_from_slice(filled);
                }
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> DeflateStream<S> {
    fn drain_write_out(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.write_out_pos < self.write_out.len() {
            let pending = &self.write_out[self.write_out_pos..];
            match Pin::new(&mut self.inner).poll_write(cx, pending) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Ready(Ok(n)) => self.write_out_pos += n,
            }
        }
        self.write_out.clear();
        self.write_out_pos = 0;
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeflateStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        let mut consumed = 0;
        while consumed < buf.len() {
            this.write_out.reserve(CHUNK);
            let before_in = this.deflate.total_in();
            this.deflate
                .compress_vec(&buf[consumed..], &mut this.write_out, FlushCompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            consumed += (this.deflate.total_in() - before_in) as usize;
        }
        this.needs_sync = true;

        // Push what we can; buffering the rest until the next flush is fine.
        let _ = this.drain_write_out(cx)?;

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.needs_sync {
            loop {
                this.write_out.reserve(CHUNK);
                this.deflate
                    .compress_vec(&[], &mut this.write_out, FlushCompress::Sync)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                // Room left over means the sync flush fit completely.
                if this.write_out.len() < this.write_out.capacity() {
                    break;
                }
            }
            this.needs_sync = false;
        }

        match this.drain_write_out(cx)? {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(()) => {}
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.drain_write_out(cx)? {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(()) => {}
        }
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = DeflateStream::new(client);
        let mut server = DeflateStream::new(server);

        let payload = b"* OK Missive ready\r\n".repeat(50);
        client.write_all(&payload).await.unwrap();
        client.flush().await.unwrap();

        let mut read_back = vec![0u8; payload.len()];
        server.read_exact(&mut read_back).await.unwrap();
        assert_eq!(read_back, payload);

        // And the other direction on the same streams.
        server.write_all(b"a1 NOOP\r\n").await.unwrap();
        server.flush().await.unwrap();
        let mut line = vec![0u8; 9];
        client.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"a1 NOOP\r\n");
    }

    #[tokio::test]
    async fn test_with_buffered_prefix() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = DeflateStream::new(client);

        client.write_all(b"hello world").await.unwrap();
        client.flush().await.unwrap();

        // Split the compressed bytes: pretend some were already buffered
        // by the reader before the upgrade.
        let mut raw = Vec::new();
        let mut server_raw = server;
        let mut tmp = [0u8; 1024];
        let n = server_raw.read(&mut tmp).await.unwrap();
        raw.extend_from_slice(&tmp[..n]);

        let (head, tail) = raw.split_at(3);
        let (replay_client, replay_server) = tokio::io::duplex(1024);
        let mut replay_client = replay_client;
        replay_client.write_all(tail).await.unwrap();
        replay_client.flush().await.unwrap();

        let mut wrapped = DeflateStream::with_buffered(replay_server, head.to_vec());
        let mut plain = vec![0u8; 11];
        wrapped.read_exact(&mut plain).await.unwrap();
        assert_eq!(&plain, b"hello world");
    }
}
