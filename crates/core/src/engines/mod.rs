pub mod http;

pub use http::HttpIndexEngine;
