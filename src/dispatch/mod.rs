//! Dispatch module - from free text to a finished task.
//!
//! Each request runs one straight chain:
//! 1. Classify the text into a registered task plus raw arguments
//! 2. Resolve the task in the registry
//! 3. Decode the arguments against its schema and confine paths to the data root
//! 4. Execute the task

mod classifier;
mod dispatcher;
mod prompt;

pub use classifier::{Classification, ClassificationError, Classifier};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use prompt::build_system_prompt;
