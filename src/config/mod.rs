// Configuration Module
// "Read the sky, then the ground"

mod config_impl;
pub mod utils;


pub use config_impl::*;
pub use utils::*;
