pub mod executor;
pub mod launcher;
