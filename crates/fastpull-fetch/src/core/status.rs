use url::Url;

pub fn is_success_status(status: u16) -> bool { (200..300).contains(&status) }

/// Client errors that no amount of retrying can fix.
pub fn is_terminal_status(status: u16) -> bool { matches!(status, 400 | 404 | 410) }

/// Key used for per-host slot accounting: the lowercase host, plus the port
/// when it is not the scheme default.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}
