//! Jobs that reconcile every object of one type at once.

mod delete;
mod store;

pub use delete::{DeleteObjectsByTypeJob, DeleteReport, NotDeletedObject};
pub use store::{StoreObjectsByTypeJob, StoreReport};
