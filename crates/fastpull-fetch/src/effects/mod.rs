//! Network and file I/O: the HTTP client seam, temp file sinks and the
//! spider that drives them.

mod http;
mod sink;
mod spider;

pub use http::{BoxStream, HttpClient, HttpGet, HttpResponse};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use spider::WebSpider;
