//! Stream session lifecycle: go-live trigger, status polling and closure.

pub mod poller;

pub use poller::{FirstCheck, PollOutcome, SessionPoller};
