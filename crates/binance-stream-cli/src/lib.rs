/*
[INPUT]:  Public API exports for binance-stream-cli crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod output;

// Re-export main types for convenience
pub use config::{MarketStreamConfig, RunnerConfig, StreamKind, UserStreamConfig};
pub use output::event_line;
