pub mod checker;
pub mod command;
pub mod domain;
pub mod pipeline;
pub mod traits;
