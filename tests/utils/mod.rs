pub mod mocks;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use mocks::{CannedResponder, ClientHandle, LoopbackServer};
#[allow(unused_imports)]
pub use setup::{init_tracing, TestEnv, TestEnvBuilder};
