pub(crate) use monitor_stage::MonitorStage;
pub(crate) use queue::RequestQueue;
pub(crate) use submission_stage::SubmissionStage;
pub(crate) use utils::call_with_bounded_retries;

pub mod monitor_stage;
mod queue;
pub mod submission_stage;
mod utils;
