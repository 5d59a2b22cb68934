mod broadcaster;
mod connection;
mod handler;
mod message;

pub use broadcaster::*;
pub use connection::*;
pub use handler::*;
pub use message::*;
