//! Fetching artifacts over HTTP and checking their integrity

pub mod download;
pub mod http;
pub mod verify;

pub use download::{DownloadSpec, Downloaded};
pub use http::HttpClient;
pub use verify::{ChecksumUrl, Verification};
