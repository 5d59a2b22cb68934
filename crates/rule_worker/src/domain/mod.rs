mod guarded;
mod rule_engine;

pub use guarded::*;
pub use rule_engine::*;
