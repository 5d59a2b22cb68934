mod position_processor;

pub use position_processor::*;
