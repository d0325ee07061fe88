pub mod gate;
pub mod task;

pub use gate::{LoadGate, LoadSnapshot, MAX_LOAD, MAX_WAIT_TIME};
pub use task::{Task, TaskId};
