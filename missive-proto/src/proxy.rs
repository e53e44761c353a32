//! PROXY protocol v1/v2 (haproxy), consumed before TLS and before the
//! first IMAP byte. A parse failure is fatal for the connection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{bail, Context, Result};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res},
    sequence::tuple,
    IResult,
};
use tokio::io::{AsyncRead, AsyncReadExt};

const V2_SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];
const V1_MAX_LINE: usize = 107;

/// The peer address asserted by the proxy, when it asserted one
/// (`UNKNOWN` and `LOCAL` carry none).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    pub source: Option<SocketAddr>,
}

/// Read and parse the PROXY header off the front of the stream.
pub async fn read_proxy_header<S: AsyncRead + Unpin>(stream: &mut S) -> Result<ProxyHeader> {
    // Twelve bytes disambiguate: the v2 signature is exactly twelve, and
    // the shortest v1 line ("PROXY UNKNOWN\r\n") is longer.
    let mut head = [0u8; 12];
    stream
        .read_exact(&mut head)
        .await
        .context("reading PROXY protocol signature")?;

    if head == V2_SIGNATURE {
        return read_v2(stream).await;
    }
    if head.starts_with(b"PROXY ") {
        return read_v1(stream, &head).await;
    }
    bail!("stream does not start with a PROXY protocol header");
}

async fn read_v1<S: AsyncRead + Unpin>(stream: &mut S, head: &[u8]) -> Result<ProxyHeader> {
    let mut line = head.to_vec();
    loop {
        if line.len() > V1_MAX_LINE {
            bail!("PROXY v1 line exceeds {} bytes", V1_MAX_LINE);
        }
        let byte = stream.read_u8().await.context("reading PROXY v1 line")?;
        line.push(byte);
        if byte == b'\n' {
            break;
        }
    }

    match parse_v1_line(&line) {
        Ok((_, header)) => Ok(header),
        Err(_) => bail!("malformed PROXY v1 line"),
    }
}

fn parse_v1_line(input: &[u8]) -> IResult<&[u8], ProxyHeader> {
    alt((
        map(
            tuple((tag(b"PROXY UNKNOWN"), take_while1(|b| b != b'\n'), tag(b"\n"))),
            |_| ProxyHeader { source: None },
        ),
        map(
            tuple((
                tag(b"PROXY "),
                alt((tag(b"TCP4"), tag(b"TCP6"))),
                char(' '),
                ip_addr,
                char(' '),
                ip_addr,
                char(' '),
                port,
                char(' '),
                port,
                tag(b"\r\n"),
            )),
            |(_, _, _, src_ip, _, _dst_ip, _, src_port, _, _dst_port, _)| ProxyHeader {
                source: Some(SocketAddr::new(src_ip, src_port)),
            },
        ),
    ))(input)
}

fn ip_addr(input: &[u8]) -> IResult<&[u8], IpAddr> {
    map_res(
        take_while1(|b: u8| b.is_ascii_hexdigit() || b == b'.' || b == b':'),
        |bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<IpAddr>().ok())
                .ok_or("bad address")
        },
    )(input)
}

fn port(input: &[u8]) -> IResult<&[u8], u16> {
    map_res(digit1, |bytes: &[u8]| {
        // Safety: digits are ASCII-only.
        std::str::from_utf8(bytes).unwrap().parse::<u16>()
    })(input)
}

async fn read_v2<S: AsyncRead + Unpin>(stream: &mut S) -> Result<ProxyHeader> {
    let mut fixed = [0u8; 4];
    stream
        .read_exact(&mut fixed)
        .await
        .context("reading PROXY v2 header")?;
    let [ver_cmd, family, len_hi, len_lo] = fixed;

    if ver_cmd >> 4 != 0x2 {
        bail!("unsupported PROXY protocol version {:#x}", ver_cmd >> 4);
    }

    let len = usize::from(u16::from_be_bytes([len_hi, len_lo]));
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .context("reading PROXY v2 addresses")?;

    // LOCAL: health checks and the like; keep the socket's own peer.
    if ver_cmd & 0x0F == 0x0 {
        return Ok(ProxyHeader { source: None });
    }

    let source = match family {
        // TCP over IPv4
        0x11 if len >= 12 => {
            let ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
            let src_port = u16::from_be_bytes([payload[8], payload[9]]);
            Some(SocketAddr::new(IpAddr::V4(ip), src_port))
        }
        // TCP over IPv6
        0x21 if len >= 36 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&payload[0..16]);
            let src_port = u16::from_be_bytes([payload[32], payload[33]]);
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), src_port))
        }
        _ => None,
    };

    Ok(ProxyHeader { source })
}
