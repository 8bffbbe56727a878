pub mod content;
pub mod error;
