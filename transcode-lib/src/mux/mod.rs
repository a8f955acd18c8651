//! Multiplexing: the scheduler and the built-in packet log container

pub mod packet_log;
pub mod scheduler;

pub use packet_log::PacketLogWriter;
pub use scheduler::{LaneFailure, Scheduler, Step, StreamStats};
