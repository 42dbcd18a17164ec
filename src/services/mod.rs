pub mod assembler;
pub mod fallback;
pub mod postprocess;
pub mod relay;
pub mod upstream;

pub use upstream::UpstreamClient;
