mod report;
mod watcher;

pub use report::{run_check, CheckReport};
pub use watcher::{run_watch, WatchMessage, Watcher};
