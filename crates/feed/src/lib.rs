//! Feed controller: merges history fetches and live delivery into one
//! ordered, searchable view.

pub mod controller;
mod state;
pub mod view;

pub use controller::{ControllerOptions, FeedController};
pub use view::FeedView;
