mod system;
mod ws;

pub use system::{index, not_found};
pub use ws::ws_route;
