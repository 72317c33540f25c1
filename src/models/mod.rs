pub mod error;
pub mod image;
pub mod update;

pub use error::*;
pub use image::*;
pub use update::*;
