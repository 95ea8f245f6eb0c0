//! The assembled interceptor

mod builder;
mod tilegate;

pub use builder::TilegateBuilder;
pub use tilegate::Tilegate;
