use std::io;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;

/// Issues a single GET and reports the status code.
///
/// Implementations must report request-level timeouts as `io::ErrorKind::TimedOut`; workers
/// tolerate those silently and treat every other error kind as a real failure.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> io::Result<u16>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> io::Result<HttpTransport> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> io::Result<u16> {
        match self.client.get(url).send() {
            Ok(response) => {
                debug!("{} bytes expected from {}", response.content_length().unwrap_or(0), url);
                Ok(response.status().as_u16())
            }
            Err(e) if e.is_timeout() => Err(io::Error::new(io::ErrorKind::TimedOut, e)),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}
