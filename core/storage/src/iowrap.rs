//! Stream helpers shared by the adapters.

use std::io;
use std::io::SeekFrom;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};

use crate::pairs::IoCallback;

/// Byte stream handed to and returned from storagers.
pub type Reader = Box<dyn AsyncRead + Send + Unpin>;

pub type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Buffer size for whole-stream copies.
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// Reader that reports every chunk it yields to a callback.
pub struct CallbackReader<R> {
    inner: R,
    callback: IoCallback,
}

impl<R> CallbackReader<R> {
    pub fn new(inner: R, callback: IoCallback) -> Self {
        Self { inner, callback }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CallbackReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let chunk = &buf.filled()[before..];
            if !chunk.is_empty() {
                (this.callback)(chunk);
            }
        }
        poll
    }
}

/// Attach `callback` to `reader` when one was passed.
pub fn with_callback(reader: Reader, callback: Option<IoCallback>) -> Reader {
    match callback {
        Some(cb) => Box::new(CallbackReader::new(reader, cb)),
        None => reader,
    }
}

/// Restrict a reader to at most `size` bytes when a size is given.
pub fn limit<R>(reader: R, size: Option<u64>) -> Reader
where
    R: AsyncRead + Send + Unpin + 'static,
{
    match size {
        Some(n) => Box::new(reader.take(n)),
        None => Box::new(reader),
    }
}

/// Reader over `[offset, offset + size)` of a seekable source.
///
/// Without an offset reading starts at the current position; without a
/// size it runs to the end.
pub async fn section<R>(mut reader: R, offset: Option<u64>, size: Option<u64>) -> io::Result<Reader>
where
    R: AsyncRead + AsyncSeek + Send + Unpin + 'static,
{
    if let Some(offset) = offset {
        reader.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(limit(reader, size))
}

/// Copy `reader` into `writer` and flush.
///
/// With a size exactly that many bytes are copied and a shorter source
/// fails with `UnexpectedEof`; otherwise the whole stream is copied.
pub async fn copy<R, W>(reader: &mut R, writer: &mut W, size: Option<u64>) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let written = match size {
        Some(n) => {
            let mut limited = reader.take(n);
            let written = tokio::io::copy(&mut limited, writer).await?;
            if written < n {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, source ended after {}", n, written),
                ));
            }
            written
        }
        None => {
            let mut buffered = BufReader::with_capacity(BUFFER_SIZE, reader);
            tokio::io::copy_buf(&mut buffered, writer).await?
        }
    };

    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_callback_sees_every_byte() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: IoCallback = Box::new(move |chunk| sink.lock().unwrap().extend_from_slice(chunk));

        let mut r = CallbackReader::new(Cursor::new(b"hello world".to_vec()), cb);
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"hello world");
        assert_eq!(seen.lock().unwrap().as_slice(), b"hello world");
    }

    #[tokio::test]
    async fn test_section_reads_window() {
        let mut r = section(Cursor::new(b"0123456789".to_vec()), Some(3), Some(4))
            .await
            .unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "3456");
    }

    #[tokio::test]
    async fn test_section_offset_only_runs_to_end() {
        let mut r = section(Cursor::new(b"0123456789".to_vec()), Some(7), None)
            .await
            .unwrap();
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "789");
    }

    #[tokio::test]
    async fn test_limit_size_only() {
        let mut r = limit(Cursor::new(b"0123456789".to_vec()), Some(5));
        let mut out = String::new();
        r.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "01234");
    }

    #[tokio::test]
    async fn test_copy_exact_size() {
        let mut src = Cursor::new(b"abcdefgh".to_vec());
        let mut dst = Vec::new();
        let n = copy(&mut src, &mut dst, Some(3)).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(dst, b"abc");
    }

    #[tokio::test]
    async fn test_copy_short_source_fails() {
        let mut src = Cursor::new(b"ab".to_vec());
        let mut dst = Vec::new();
        let err = copy(&mut src, &mut dst, Some(10)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_copy_until_eof() {
        let data = vec![7u8; BUFFER_SIZE + 17];
        let mut src = Cursor::new(data.clone());
        let mut dst = Vec::new();
        let n = copy(&mut src, &mut dst, None).await.unwrap();
        assert_eq!(n as usize, data.len());
        assert_eq!(dst, data);
    }
}
