pub mod types;
pub mod init;
pub mod pipelines;
pub mod surface;
pub mod renderer;
pub mod info;


pub use types::*;
pub use pipelines::*;
pub use surface::*;
pub use renderer::*;
