// Library exports for the CLI, the proxy binary and integration tests

pub mod auth;
pub mod config;
pub mod format;
pub mod playback;
pub mod processing;
pub mod proxy;
pub mod recordings;
pub mod screens;
pub mod subscription;

// Test support (unit tests, or integration tests via the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
