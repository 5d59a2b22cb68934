mod status_engine;

pub use status_engine::*;
