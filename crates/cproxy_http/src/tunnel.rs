//! CONNECT (tunnel) detection and rejection on the raw socket.

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Exact bytes written back to a client asking for a tunnel.
pub const TUNNEL_REJECTED: &[u8] = b"HTTP/1.1 501 Not Implemented\r\n\r\n";

const CONNECT_PREFIX: &[u8] = b"CONNECT ";

/// True when the first peeked bytes of a connection start a CONNECT request.
pub fn is_tunnel_request(peeked: &[u8]) -> bool {
    peeked.starts_with(CONNECT_PREFIX)
}

/// True while `peeked` could still turn out to be a CONNECT request.
pub fn could_be_tunnel_request(peeked: &[u8]) -> bool {
    peeked.len() < CONNECT_PREFIX.len() && CONNECT_PREFIX.starts_with(peeked)
}

/// Extracts `(method, target)` from the start of a request for logging.
/// Returns `None` when the request line is not complete yet or invalid.
pub fn request_line(peeked: &[u8]) -> Option<(String, String)> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    // A partial parse still fills method/path once the request line is in.
    match req.parse(peeked) {
        Ok(_) | Err(httparse::Error::TooManyHeaders) => {}
        Err(_) => return None,
    }
    Some((req.method?.to_string(), req.path?.to_string()))
}

/// Writes the literal 501 status line and closes the write half.
pub async fn reject_tunnel<S>(stream: &mut S) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(TUNNEL_REJECTED).await?;
    stream.flush().await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::{could_be_tunnel_request, is_tunnel_request, reject_tunnel, request_line};

    #[test]
    fn detects_connect_prefix() {
        assert!(is_tunnel_request(b"CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(!is_tunnel_request(b"GET http://example.com/ HTTP/1.1\r\n"));
        assert!(!is_tunnel_request(b"CONNECTED / HTTP/1.1\r\n"));
        assert!(!is_tunnel_request(b"connect example.com:443 HTTP/1.1\r\n"));
    }

    #[test]
    fn short_prefixes_are_undecided() {
        assert!(could_be_tunnel_request(b"CON"));
        assert!(!could_be_tunnel_request(b"GET"));
        assert!(!could_be_tunnel_request(b"CONNECT "));
    }

    #[test]
    fn request_line_extracts_authority() {
        let (method, target) =
            request_line(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
                .expect("expected request line");
        assert_eq!(method, "CONNECT");
        assert_eq!(target, "example.com:443");
    }

    #[test]
    fn request_line_on_partial_input() {
        let parsed = request_line(b"CONNECT example.com:443 HTTP/1.1\r\nHost: exa");
        assert_eq!(
            parsed,
            Some(("CONNECT".to_string(), "example.com:443".to_string()))
        );
        assert_eq!(request_line(b"CONNE"), None);
    }

    #[tokio::test]
    async fn reject_tunnel_writes_exact_bytes() {
        let mut out: Vec<u8> = Vec::new();
        reject_tunnel(&mut out).await.expect("write");
        assert_eq!(out, b"HTTP/1.1 501 Not Implemented\r\n\r\n");
    }
}
