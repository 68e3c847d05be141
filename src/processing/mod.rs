pub mod client;
pub mod monitor;

pub use client::{AcrClient, AcrError, PollResponse, ProcessAllResponse, WebhookResponse};
pub use monitor::{MonitorEvent, ProcessingMonitor, ProcessingProgress};
