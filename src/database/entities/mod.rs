pub mod dataset_example_revisions;
pub mod dataset_examples;
pub mod dataset_versions;
pub mod datasets;
pub mod experiment_run_annotations;

pub use dataset_example_revisions::RevisionKind;
