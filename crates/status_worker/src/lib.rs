pub mod domain;
pub mod nats;
pub mod status_worker;
