mod directory;
mod geofence_index;
mod memory;
mod status_cache;

pub use directory::*;
pub use geofence_index::*;
pub use memory::*;
pub use status_cache::*;
