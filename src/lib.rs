pub mod admission;
pub mod config;
pub mod db;
pub mod error;
pub mod global_properties;
pub mod registry;
pub mod setup;
mod utils;

pub use admission::{AdmissionHandle, AdmissionPermit};
pub use error::StudyDbError;
pub use global_properties::GlobalProperties;
pub use registry::{RegistryHandle, RegistryHooks};
pub use setup::{DbId, DbSetup, DbTarget};
pub use studydb_admission::Task;
