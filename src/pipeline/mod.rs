// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: job dispatch and lifecycle orchestration

mod dispatch;
mod orchestrator;

pub use dispatch::{ChannelPublisher, JobPublisher, JobReceiver, OutboxPublisher};
pub use orchestrator::{RepositoryDeletion, WikiService};
