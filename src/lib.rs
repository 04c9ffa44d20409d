pub mod api;
pub mod auth;
pub mod calendar;
pub mod db;
pub mod error;
pub mod gantt;
pub mod markdown;
pub mod model;
pub mod ops;
pub mod outline;
pub mod server;
pub mod tree;
pub mod validate;

pub use error::{Error, Result};
