//! Type-erased duplex streams, so upgrades (TLS, DEFLATE) can rewrap the
//! connection without infecting every signature with the concrete type.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait ReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ReadWrite for T {}

pub type AnyStream = Box<dyn ReadWrite>;

pub fn any_stream(stream: impl ReadWrite + 'static) -> AnyStream {
    Box::new(stream)
}
