mod alert_producer;
mod client;
mod consumer;
mod position_producer;
mod traits;

pub use alert_producer::*;
pub use client::*;
pub use consumer::*;
pub use position_producer::*;
pub use traits::*;

// Re-export mocks when the testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use traits::{MockJetStreamConsumer, MockJetStreamPublisher, MockPullConsumer};
