//! Agent loop
//!
//! The planner turns one natural-language instruction into a sequence of
//! skill calls chosen by the reasoning client, and returns the final answer.

pub mod planner;

pub use planner::{
    Planner, RunOutcome, RunReport, CANCELLED_TEXT, ITERATION_LIMIT_TEXT, REASONING_FAILURE_TEXT,
};
