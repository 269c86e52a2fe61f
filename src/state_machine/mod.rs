mod job;
mod state;

pub use job::{Job, canonical_url};
pub use state::{Event, JobState, JobTrace, Transition};
