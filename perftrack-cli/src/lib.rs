pub mod settings;
pub mod summary;
pub mod workload;
