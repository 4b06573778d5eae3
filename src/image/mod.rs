mod io;
mod tiling;

pub use io::*;
pub use tiling::*;
