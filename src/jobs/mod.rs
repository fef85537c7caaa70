pub mod batch_runner;
pub mod merge;
pub mod poller;
pub mod submitter;

pub use batch_runner::{BatchEvent, BatchOutcome, BatchReport, BatchRunner, Throttle};
pub use merge::{merge, Keyed};
pub use poller::{JobMonitor, MonitorEvent, MonitorState, PollHandle, PollState};
pub use submitter::submit_job;
