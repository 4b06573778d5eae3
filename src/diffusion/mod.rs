mod ddim;
mod dpm_solver;
mod model;
mod noise;
mod pipeline;
mod schedule;
mod utils;

pub use ddim::*;
pub use dpm_solver::*;
pub use model::*;
pub use noise::*;
pub use pipeline::*;
pub use schedule::*;
pub use utils::*;
