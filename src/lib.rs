pub mod database;
pub mod decode;
pub mod error;
pub mod server;
pub mod store;

pub use error::{Error, Result};
