//! Tiny HTTP servers for testing.
//!
//! These live in the library rather than a test module so the unit tests, integration tests and
//! benches can all share them.
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use log::debug;

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

fn respond(mut stream: TcpStream, status: u16) -> io::Result<()> {
    let mut buf = [0_u8; 1024];
    let mut request = Vec::new();

    // read until the end of the request head; GETs carry no body
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status,
        reason(status)
    )?;
    stream.flush()
}

/// Serve every request with an empty body and the given status. Returns the address the OS
/// assigned.
pub fn http_server(status: u16) -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    thread::spawn(move || {
                        if let Err(e) = respond(stream, status) {
                            debug!("test server: {}", e);
                        }
                    });
                }
                Err(e) => debug!("test server accept: {}", e),
            }
        }
    });

    Ok(addr)
}

/// Accept connections and never answer, for exercising client timeouts.
pub fn silent_server() -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                let mut stream = stream;
                let mut buf = [0_u8; 1024];
                // hold the socket open until the client gives up
                while let Ok(n) = stream.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });

    Ok(addr)
}
