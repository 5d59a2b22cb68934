pub mod domain;
pub mod nats;
pub mod rule_worker;
