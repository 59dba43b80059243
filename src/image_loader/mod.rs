pub mod encode;
pub mod loader;
pub mod raster;

pub use encode::*;
pub use loader::*;
pub use raster::*;
