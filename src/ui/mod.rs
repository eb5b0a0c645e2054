//! Terminal output: progress bars and reports

mod progress;
pub mod report;

pub use progress::ProgressReporter;
pub use report::{render_human, render_json, suggestion, Summary};
