pub mod cloud;
pub mod config;

pub use cloud::{CloudClient, CloudError};
pub use config::Config;
