mod studydb;

pub use studydb::StudyDbError;

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
