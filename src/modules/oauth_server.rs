// One-shot loopback listener for the OAuth redirect. Serves exactly one
// callback request, hands the authorization code back, then shuts down.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::error::{AppError, AppResult};

const CALLBACK_TIMEOUT_SECS: u64 = 300;

fn success_page() -> &'static str {
    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
    <html><body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
    <h1>Authorized</h1><p>You can close this window and return to the terminal.</p>\
    </body></html>"
}

fn failure_page() -> &'static str {
    "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
    <html><body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
    <h1>Authorization failed</h1><p>No code received. Go back and retry.</p>\
    </body></html>"
}

pub struct CallbackListener {
    listener: TcpListener,
    pub redirect_uri: String,
}

impl CallbackListener {
    /// Binds an ephemeral loopback port for the redirect URI.
    pub async fn bind() -> AppResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            redirect_uri: format!("http://localhost:{}/callback", port),
        })
    }

    /// Waits for the single redirect request and extracts `code` from its
    /// query string. Times out so an abandoned login cannot hang the CLI.
    pub async fn wait_for_code(self) -> AppResult<String> {
        let accept = tokio::time::timeout(
            std::time::Duration::from_secs(CALLBACK_TIMEOUT_SECS),
            self.listener.accept(),
        )
        .await
        .map_err(|_| AppError::Auth("timed out waiting for the OAuth callback".into()))?;

        let (mut stream, _) = accept?;
        let mut buf = vec![0u8; 8192];
        let n = stream.read(&mut buf).await?;
        let request = String::from_utf8_lossy(&buf[..n]);

        match extract_code(&request) {
            Some(code) => {
                let _ = stream.write_all(success_page().as_bytes()).await;
                Ok(code)
            }
            None => {
                let _ = stream.write_all(failure_page().as_bytes()).await;
                Err(AppError::Auth("callback carried no authorization code".into()))
            }
        }
    }
}

/// Pulls `code` out of the request line of a raw HTTP GET.
fn extract_code(raw_request: &str) -> Option<String> {
    let request_line = raw_request.lines().next()?;
    let path = request_line.split_whitespace().nth(1)?;
    let query = path.split_once('?')?.1;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == "code" && !value.is_empty() {
                return Some(urldecode(value));
            }
        }
    }
    None
}

fn urldecode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hi = bytes.next();
                let lo = bytes.next();
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    let hex = [hi, lo];
                    if let Ok(hex_str) = std::str::from_utf8(&hex) {
                        if let Ok(v) = u8::from_str_radix(hex_str, 16) {
                            out.push(v as char);
                            continue;
                        }
                    }
                }
                out.push('%');
            }
            b'+' => out.push(' '),
            other => out.push(other as char),
        }
    }
    out
}
