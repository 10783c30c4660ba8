/// Native module runs programs as plain child processes of the host,
/// without any sandboxing layer.
pub mod detached;
pub mod executor;
pub mod runner;
