pub mod store;

pub use store::{ReportEntry, ReportStore};
