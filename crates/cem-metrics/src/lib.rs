//! Operational metrics recording and housekeeping (§4.13). Raw samples are
//! written by `cem-worker`/`cem-reconcile` via the `recorder` functions as
//! work happens; `housekeeping::run_daily` is invoked by `cem-daemon`'s
//! scheduler once a day to roll them up and trim the raw table.

pub mod housekeeping;
pub mod kinds;
pub mod recorder;

pub use housekeeping::{run_daily, HousekeepingReport};
pub use recorder::{record_confidence, record_error, record_queue_depth, record_stage_duration, record_token_usage};
