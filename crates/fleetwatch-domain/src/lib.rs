mod alert;
mod error;
mod notification;
mod position;
mod repository;
mod status;
mod validate;

pub mod retry;

pub use alert::*;
pub use error::*;
pub use notification::*;
pub use position::*;
pub use repository::*;
pub use status::*;
pub use validate::*;

// Re-export mocks when the testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use repository::{
    MockAlertEventProducer, MockAlertRuleRepository, MockChannelTransport, MockDirectoryLookup,
    MockGeofenceQuery, MockLiveFeed, MockNotificationRepository, MockPositionEventProducer,
    MockPositionRepository, MockStatusCache, MockTriggerStateRepository,
    MockVehicleStateRepository,
};
