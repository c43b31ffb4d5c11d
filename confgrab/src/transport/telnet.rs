//! Minimal Telnet client stream.
//!
//! Devices reached over Telnet interleave option negotiation with their
//! CLI output. `TelnetStream` refuses every option the peer offers or
//! requests (`WONT`/`DONT`), strips negotiation and subnegotiation from the
//! inbound stream, unescapes `IAC IAC`, drops the NUL of a `CR NUL` pair and
//! escapes outbound `0xFF` bytes. What remains is the plain NVT text the
//! expect engine matches against.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BytesMut};
use log::trace;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Data,
    /// Last byte was a CR; a following NUL is padding.
    Cr,
    Iac,
    /// Inside `IAC <verb>`, waiting for the option byte.
    Negotiate(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Telnet protocol filter over any byte stream.
#[derive(Debug)]
pub struct TelnetStream<S> {
    inner: S,
    state: ParseState,
    /// Escaped application data and negotiation replies not yet written.
    outbound: BytesMut,
}

impl<S> TelnetStream<S> {
    /// Wrap a connected stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: ParseState::Data,
            outbound: BytesMut::with_capacity(256),
        }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Strip Telnet commands from `input`, appending data bytes to `out`.
    fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut i = 0;
        while i < input.len() {
            match self.state {
                ParseState::Data => {
                    let rest = &input[i..];
                    match memchr::memchr2(IAC, b'\r', rest) {
                        None => {
                            out.extend_from_slice(rest);
                            i = input.len();
                        }
                        Some(pos) => {
                            out.extend_from_slice(&rest[..pos]);
                            if rest[pos] == IAC {
                                self.state = ParseState::Iac;
                            } else {
                                out.push(b'\r');
                                self.state = ParseState::Cr;
                            }
                            i += pos + 1;
                        }
                    }
                }
                ParseState::Cr => {
                    self.state = ParseState::Data;
                    if input[i] == 0 {
                        i += 1;
                    }
                }
                ParseState::Iac => {
                    let byte = input[i];
                    i += 1;
                    self.state = match byte {
                        IAC => {
                            out.push(IAC);
                            ParseState::Data
                        }
                        DO | DONT | WILL | WONT => ParseState::Negotiate(byte),
                        SB => ParseState::Subnegotiation,
                        _ => ParseState::Data,
                    };
                }
                ParseState::Negotiate(verb) => {
                    let option = input[i];
                    i += 1;
                    self.refuse(verb, option);
                    self.state = ParseState::Data;
                }
                ParseState::Subnegotiation => {
                    if input[i] == IAC {
                        self.state = ParseState::SubnegotiationIac;
                    }
                    i += 1;
                }
                ParseState::SubnegotiationIac => {
                    self.state = if input[i] == SE {
                        ParseState::Data
                    } else {
                        ParseState::Subnegotiation
                    };
                    i += 1;
                }
            }
        }
    }

    /// Queue the refusal for a DO/WILL request. DONT/WONT need no answer.
    fn refuse(&mut self, verb: u8, option: u8) {
        let reply = match verb {
            DO => WONT,
            WILL => DONT,
            _ => return,
        };
        trace!("telnet: refusing option {} (verb {})", option, verb);
        self.outbound.extend_from_slice(&[IAC, reply, option]);
    }

    /// Queue application data, doubling any IAC bytes.
    fn encode(&mut self, data: &[u8]) {
        let mut start = 0;
        for pos in memchr::memchr_iter(IAC, data) {
            self.outbound.extend_from_slice(&data[start..=pos]);
            self.outbound.extend_from_slice(&[IAC]);
            start = pos + 1;
        }
        self.outbound.extend_from_slice(&data[start..]);
    }
}

impl<S: AsyncWrite + Unpin> TelnetStream<S> {
    /// Write queued bytes to the inner stream.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.outbound.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.outbound))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.outbound.advance(n);
        }
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for TelnetStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut scratch = vec![0u8; buf.remaining().max(1)];
        let mut decoded = Vec::with_capacity(scratch.len());

        loop {
            // Negotiation replies go out opportunistically; a full socket
            // buffer must not stall reading.
            if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
                return Poll::Ready(Err(e));
            }

            let mut raw = ReadBuf::new(&mut scratch);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut raw))?;
            let filled = raw.filled();
            if filled.is_empty() {
                return Poll::Ready(Ok(()));
            }

            decoded.clear();
            this.decode(filled, &mut decoded);
            if !decoded.is_empty() {
                buf.put_slice(&decoded);
                return Poll::Ready(Ok(()));
            }
            // The whole read was protocol traffic; an empty return would
            // look like EOF, so keep reading.
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TelnetStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        this.encode(buf);
        if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain(cx))?;
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[test]
    fn test_decode_plain_text() {
        let mut stream = TelnetStream::new(());
        let mut out = Vec::new();
        stream.decode(b"Username: ", &mut out);
        assert_eq!(out, b"Username: ");
        assert!(stream.outbound.is_empty());
    }

    #[test]
    fn test_decode_refuses_options() {
        let mut stream = TelnetStream::new(());
        let mut out = Vec::new();
        // IAC DO ECHO, IAC WILL SUPPRESS-GO-AHEAD, IAC WONT LINEMODE
        stream.decode(&[IAC, DO, 1, IAC, WILL, 3, IAC, WONT, 34], &mut out);
        assert!(out.is_empty());
        assert_eq!(&stream.outbound[..], &[IAC, WONT, 1, IAC, DONT, 3]);
    }

    #[test]
    fn test_decode_command_split_across_reads() {
        let mut stream = TelnetStream::new(());
        let mut out = Vec::new();
        stream.decode(b"login", &mut out);
        stream.decode(&[IAC], &mut out);
        stream.decode(&[DO], &mut out);
        stream.decode(&[24, b':', b' '], &mut out);
        assert_eq!(out, b"login: ");
        assert_eq!(&stream.outbound[..], &[IAC, WONT, 24]);
    }

    #[test]
    fn test_decode_subnegotiation_and_escapes() {
        let mut stream = TelnetStream::new(());
        let mut out = Vec::new();
        stream.decode(&[b'a', IAC, SB, 24, 1, IAC, SE, b'b', IAC, IAC, b'c'], &mut out);
        assert_eq!(out, &[b'a', b'b', IAC, b'c']);
    }

    #[test]
    fn test_decode_cr_nul() {
        let mut stream = TelnetStream::new(());
        let mut out = Vec::new();
        stream.decode(b"one\r", &mut out);
        stream.decode(b"\0two\r\nthree", &mut out);
        assert_eq!(out, b"one\rtwo\r\nthree");
    }

    #[test]
    fn test_encode_escapes_iac() {
        let mut stream = TelnetStream::new(());
        stream.encode(&[b'x', IAC, b'y']);
        assert_eq!(&stream.outbound[..], &[b'x', IAC, IAC, b'y']);
    }

    #[tokio::test]
    async fn test_stream_negotiation_roundtrip() {
        let (client, mut device) = duplex(64);
        let mut telnet = TelnetStream::new(client);

        device.write_all(&[IAC, DO, 1]).await.unwrap();
        device.write_all(b"Password: ").await.unwrap();

        let mut buf = [0u8; 32];
        let n = telnet.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Password: ");

        telnet.write_all(b"secret\r\n").await.unwrap();
        telnet.flush().await.unwrap();

        let mut received = [0u8; 11];
        device.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..3], &[IAC, WONT, 1]);
        assert_eq!(&received[3..], b"secret\r\n");
    }

    #[tokio::test]
    async fn test_stream_eof() {
        let (client, device) = duplex(64);
        let mut telnet = TelnetStream::new(client);
        drop(device);

        let mut buf = [0u8; 8];
        assert_eq!(telnet.read(&mut buf).await.unwrap(), 0);
    }
}
