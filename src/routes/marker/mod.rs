pub mod handler;
pub mod model;
pub mod service;

pub use handler::{confirm_marker, create_marker, delete_marker, list_markers};
pub use service::MarkerService;
