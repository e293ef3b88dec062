//! HTTP transport shared by the description fetcher and the SOAP client.
//!
//! Many gateways run single-threaded embedded HTTP servers, so a client holds
//! an async mutex and keeps at most one request in flight.
//!
//! With [`HeaderCase::Verbatim`] SOAP requests bypass reqwest and are written
//! by hand on a TCP stream, since hyper normalizes header names.

use crate::error::{Error, Result, TransportFailure};
use crate::quirks::HeaderCase;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// Upper bound on a hand-read SOAP response.
const MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// A response whose status may be an error.
#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
    header_case: HeaderCase,
    in_flight: Mutex<()>,
}

impl HttpClient {
    pub fn new(timeout: Duration, header_case: HeaderCase) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(Error::HttpClient)?;
        Ok(HttpClient {
            client,
            timeout,
            header_case,
            in_flight: Mutex::new(()),
        })
    }

    /// GET a document; non-2xx statuses are failures.
    pub async fn get(&self, url: &str) -> std::result::Result<String, TransportFailure> {
        let _permit = self.in_flight.lock().await;
        tracing::debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.failure(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Status(status.as_u16()));
        }
        response.text().await.map_err(|e| self.failure(e))
    }

    /// POST a SOAP envelope. Error statuses are returned, not failed, since
    /// they usually carry a SOAP fault body.
    pub async fn post_soap(
        &self,
        url: &str,
        soap_action: &str,
        body: String,
    ) -> std::result::Result<HttpResponse, TransportFailure> {
        let _permit = self.in_flight.lock().await;
        tracing::debug!(url, soap_action, header_case = ?self.header_case, "POST");
        if self.header_case == HeaderCase::Verbatim {
            return tokio::time::timeout(self.timeout, post_verbatim(url, soap_action, &body))
                .await
                .map_err(|_| TransportFailure::Timeout(self.timeout))?;
        }

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPACTION", soap_action)
            .body(body)
            .send()
            .await
            .map_err(|e| self.failure(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.failure(e))?;
        Ok(HttpResponse { status, body })
    }

    fn failure(&self, error: reqwest::Error) -> TransportFailure {
        if error.is_timeout() {
            TransportFailure::Timeout(self.timeout)
        } else {
            TransportFailure::Http(error)
        }
    }
}

async fn post_verbatim(
    url: &str,
    soap_action: &str,
    body: &str,
) -> std::result::Result<HttpResponse, TransportFailure> {
    let url = Url::parse(url)
        .map_err(|e| TransportFailure::MalformedResponse(format!("bad URL {url}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| TransportFailure::MalformedResponse(format!("URL {url} has no host")))?;
    let port = url.port_or_known_default().unwrap_or(80);
    let path = match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    };

    let request = format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Content-Type: {SOAP_CONTENT_TYPE}\r\n\
         Content-Length: {}\r\n\
         SOAPAction: {soap_action}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    let mut stream = TcpStream::connect(format!("{host}:{port}")).await?;
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        if raw.len() > MAX_RESPONSE_SIZE {
            return Err(TransportFailure::MalformedResponse(format!(
                "response larger than {MAX_RESPONSE_SIZE} bytes"
            )));
        }
        if response_complete(&raw) {
            break;
        }
    }
    parse_response(&raw)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Status line and headers, and the body bytes after them.
fn split_head(raw: &[u8]) -> Option<(String, &[u8])> {
    let end = find(raw, b"\r\n\r\n")?;
    Some((
        String::from_utf8_lossy(&raw[..end]).into_owned(),
        &raw[end + 4..],
    ))
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

fn is_chunked(head: &str) -> bool {
    header(head, "Transfer-Encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
}

// Without a length or chunked framing the body runs until the peer closes.
fn response_complete(raw: &[u8]) -> bool {
    let Some((head, body)) = split_head(raw) else {
        return false;
    };
    if is_chunked(&head) {
        return body.ends_with(b"0\r\n\r\n");
    }
    match header(&head, "Content-Length").and_then(|v| v.parse::<usize>().ok()) {
        Some(length) => body.len() >= length,
        None => false,
    }
}

fn parse_response(raw: &[u8]) -> std::result::Result<HttpResponse, TransportFailure> {
    let (head, body) = split_head(raw).ok_or_else(|| {
        TransportFailure::MalformedResponse("response ended inside the headers".to_string())
    })?;
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            TransportFailure::MalformedResponse(format!(
                "bad status line {:?}",
                head.lines().next().unwrap_or_default()
            ))
        })?;

    let body = if is_chunked(&head) {
        dechunk(body)?
    } else {
        match header(&head, "Content-Length").and_then(|v| v.parse::<usize>().ok()) {
            Some(length) => body[..length.min(body.len())].to_vec(),
            None => body.to_vec(),
        }
    };
    Ok(HttpResponse {
        status,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn dechunk(mut body: &[u8]) -> std::result::Result<Vec<u8>, TransportFailure> {
    let truncated = || TransportFailure::MalformedResponse("truncated chunked body".to_string());
    let mut out = Vec::new();
    loop {
        let line_end = find(body, b"\r\n").ok_or_else(truncated)?;
        let size_line = String::from_utf8_lossy(&body[..line_end]);
        let size_text = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16).map_err(|_| {
            TransportFailure::MalformedResponse(format!("bad chunk size {size_text:?}"))
        })?;
        body = &body[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if body.len() < size {
            return Err(truncated());
        }
        out.extend_from_slice(&body[..size]);
        body = body[size..].strip_prefix(b"\r\n").unwrap_or(&body[size..]);
    }
}
