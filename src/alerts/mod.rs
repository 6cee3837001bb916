mod export;
mod log;
mod writer;

pub use log::{Alert, AlertKind, AlertLog, SharedAlertLog};
pub use writer::AlertWriter;
