pub mod clock;
pub mod inflight;
pub mod subscribers;
pub mod units;
