pub mod locks;
pub mod materializer;
pub mod query;
pub mod queue;
pub mod reconciler;
pub mod storage;
pub mod store;
pub mod submission;
