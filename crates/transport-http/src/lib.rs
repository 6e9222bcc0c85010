// HTTP transport: remote source resolution and clip download

pub mod client;
pub mod download;
pub mod resolver;

pub use client::{create_http_agent, retry_request};
pub use download::download_clip;
pub use resolver::HttpResolver;
