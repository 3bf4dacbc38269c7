use std::{io::Read, time::Duration};

use thermometer_common::{HttpResponse, Transport, TransportError};

const MAX_RESPONSE_BYTES: u64 = 16 * 1024;

/// Blocking JSON POST for the host build, one request per sync cycle.
pub struct HttpTransport {
    agent: ureq::Agent,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(timeout_ms: u64) -> Self {
        let timeout = Duration::from_millis(timeout_ms);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { agent, timeout_ms }
    }

    fn transport_error(&self, err: &ureq::Error) -> TransportError {
        match err.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                TransportError::InvalidUrl(err.to_string())
            }
            ureq::ErrorKind::Io | ureq::ErrorKind::ConnectionFailed if is_timeout(err) => {
                TransportError::Timeout(self.timeout_ms)
            }
            ureq::ErrorKind::Io | ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns => {
                TransportError::Io(err.to_string())
            }
            _ => TransportError::Protocol(err.to_string()),
        }
    }
}

impl Transport for HttpTransport {
    fn post_json(&mut self, url: &str, body: &[u8]) -> Result<HttpResponse, TransportError> {
        let result = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_bytes(body);

        // Non-2xx answers still carry a status and body for the caller to judge.
        let response = match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => response,
            Err(err @ ureq::Error::Transport(_)) => return Err(self.transport_error(&err)),
        };

        let status = response.status();
        let mut payload = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut payload)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                    TransportError::Timeout(self.timeout_ms)
                }
                _ => TransportError::from(err),
            })?;

        Ok(HttpResponse {
            status,
            body: payload,
        })
    }
}

fn is_timeout(err: &ureq::Error) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{
        io::Write,
        net::{TcpListener, TcpStream},
        thread::{self, JoinHandle},
    };

    /// Accepts one connection, captures the request and answers with `reply`.
    fn serve_once(path: &str, reply: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}{path}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(reply.as_bytes()).unwrap();
            request
        });
        (url, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&raw).into_owned();
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= split + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    #[test]
    fn posts_json_and_returns_body() {
        let (url, server) = serve_once(
            "/data",
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{\"sensor1\":true}",
        );
        let mut transport = HttpTransport::new(2_000);

        let response = transport.post_json(&url, br#"{"temp1":21.5}"#).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{\"sensor1\":true}".to_vec());
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /data HTTP/1.1\r\n"));
        assert!(request
            .to_ascii_lowercase()
            .contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"temp1":21.5}"#));
    }

    #[test]
    fn error_status_is_handed_back_with_body() {
        let (url, server) = serve_once(
            "/data",
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 18\r\nConnection: close\r\n\r\n{\"status\":\"error\"}",
        );
        let mut transport = HttpTransport::new(2_000);

        let response = transport.post_json(&url, b"{}").unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.body, b"{\"status\":\"error\"}".to_vec());
        server.join().unwrap();
    }

    #[test]
    fn query_string_reaches_the_server() {
        let (url, server) = serve_once(
            "/data?device=kitchen",
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        );
        let mut transport = HttpTransport::new(2_000);

        transport.post_json(&url, b"{}").unwrap();

        assert!(server
            .join()
            .unwrap()
            .starts_with("POST /data?device=kitchen HTTP/1.1\r\n"));
    }

    #[test]
    fn unusable_urls_are_invalid() {
        let mut transport = HttpTransport::new(500);

        for url in ["ftp://127.0.0.1/data", "not a url"] {
            assert!(
                matches!(
                    transport.post_json(url, b"{}"),
                    Err(TransportError::InvalidUrl(_))
                ),
                "{url}"
            );
        }
    }

    #[test]
    fn refused_connection_is_an_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/data", listener.local_addr().unwrap());
        drop(listener);
        let mut transport = HttpTransport::new(500);

        assert!(matches!(
            transport.post_json(&url, b"{}"),
            Err(TransportError::Io(_))
        ));
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/data", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(600));
            drop(stream);
        });
        let mut transport = HttpTransport::new(100);

        assert!(matches!(
            transport.post_json(&url, b"{}"),
            Err(TransportError::Timeout(100))
        ));
        server.join().unwrap();
    }
}
