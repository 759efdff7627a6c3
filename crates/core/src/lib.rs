pub mod config;
pub mod error;
pub mod placement;
pub mod pod;

pub use config::ClientConfig;
pub use error::*;
pub use placement::*;
pub use pod::*;
