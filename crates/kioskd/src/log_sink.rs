//! Attendance log delivery: one JSON `POST` per event to the web log endpoint.

use kiosk_core::{AttendanceEvent, EventSink, SinkError};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Parsed `http://host[:port]/path` target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, SinkError> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| SinkError::InvalidUrl(format!("{url}: only http:// is supported")))?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(SinkError::InvalidUrl(format!("{url}: missing host")));
        }

        let bad_port = |port: &str| SinkError::InvalidUrl(format!("{url}: bad port {port:?}"));
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // IPv6 literal: `[addr]` or `[addr]:port`.
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| SinkError::InvalidUrl(format!("{url}: unterminated IPv6 literal")))?;
            let port = match tail {
                "" => 80,
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(|| bad_port(tail))?;
                    port.parse().map_err(|_| bad_port(port))?
                }
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, port.parse().map_err(|_| bad_port(port))?),
                None => (authority, 80),
            }
        };
        if host.is_empty() {
            return Err(SinkError::InvalidUrl(format!("{url}: missing host")));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == 80 {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

/// Posts each event as JSON over a fresh HTTP/1.1 connection.
///
/// `timeout` bounds connect, write and read. Host names are resolved on every
/// send through the system resolver, which has no timeout of its own; point
/// `log_url` at an IP literal where a slow DNS server could stall the kiosk.
pub struct HttpLogSink {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpLogSink {
    /// Fails only on a malformed URL; the server is not contacted until the first event.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SinkError> {
        Ok(Self {
            endpoint: Endpoint::parse(url)?,
            timeout,
        })
    }

    fn connect(&self) -> Result<TcpStream, SinkError> {
        let addrs: Vec<SocketAddr> = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(SinkError::Io(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")
        })))
    }
}

impl EventSink for HttpLogSink {
    fn send(&mut self, event: &AttendanceEvent) -> Result<(), SinkError> {
        let body = serde_json::to_vec(event)?;
        let mut stream = self.connect()?;

        let head = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.endpoint.path,
            self.endpoint.host_header(),
            body.len()
        );
        stream.write_all(head.as_bytes())?;
        stream.write_all(&body)?;
        stream.flush()?;

        let mut status_line = String::new();
        BufReader::new(stream).read_line(&mut status_line)?;
        let status = parse_status(&status_line)?;

        tracing::debug!(status, name = %event.name, authorized = event.authorized, "attendance event posted");
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(SinkError::Status(status))
        }
    }
}

fn parse_status(line: &str) -> Result<u16, SinkError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| SinkError::BadResponse(line.trim().to_string())),
        _ => Err(SinkError::BadResponse(line.trim().to_string())),
    }
}
