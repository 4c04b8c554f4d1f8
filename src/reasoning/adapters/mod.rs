pub mod http;

pub use http::HttpReasoningAdapter;
