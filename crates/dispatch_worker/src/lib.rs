pub mod dispatch_worker;
pub mod domain;
pub mod nats;
