//! Pipeline tasks.
//!
//! The run controller executes [`ReadoutTask`] on the calling thread and the
//! other tasks on scoped threads. Tasks communicate only through the two
//! superpage queues, the shared [`RunStats`](crate::stats::RunStats) and a
//! [`CancelToken`].

mod cancel;
mod hammer;
mod monitor;
mod push;
mod readout;

pub use cancel::CancelToken;
pub use hammer::BarHammer;
pub use monitor::{MonitorTask, StatusDisplay};
pub use push::PushTask;
pub use readout::{ReadoutTask, PAGE_RESET_WORD};
