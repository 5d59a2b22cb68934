mod dispatch_service;
mod log_transport;

pub use dispatch_service::*;
pub use log_transport::*;
