pub mod ingest;
pub mod revision_log;
pub mod snapshot;
pub mod upsert;
