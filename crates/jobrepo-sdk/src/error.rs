use jobrepo_types::{EntityId, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// A lower-level failure annotated with the job and ref it happened on.
    #[error("job {job} ({reference}): {source}")]
    Job {
        job: EntityId,
        reference: String,
        #[source]
        source: Box<SdkError>,
    },

    /// The commit and ref update landed, but the staged rows could not all be
    /// moved to `committed`. Retry with `reconcile`.
    #[error("commit {commit} written but {actual} of {expected} staged rows transitioned")]
    CommitReconciliationFailure {
        commit: ObjectId,
        expected: usize,
        actual: usize,
    },

    #[error("inconsistent repository state: {0}")]
    InconsistentRepositoryState(String),

    #[error("nothing staged to commit")]
    NothingToCommit,

    #[error("repository already initialized at {0}")]
    AlreadyInitialized(ObjectId),

    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("config error: {0}")]
    Config(String),

    #[error("status error: {0}")]
    Status(#[from] jobrepo_index::StatusError),

    #[error("record error: {0}")]
    Record(#[from] jobrepo_records::RecordError),

    #[error("store error: {0}")]
    Store(#[from] jobrepo_store::StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] jobrepo_refs::RefError),

    #[error("tree error: {0}")]
    Tree(#[from] jobrepo_tree::TreeError),

    #[error("diff error: {0}")]
    Diff(#[from] jobrepo_diff::DiffError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Wrap with job and ref context. Already-annotated errors pass through.
    pub fn in_job(self, job: &EntityId, reference: &str) -> Self {
        match self {
            e @ Self::Job { .. } => e,
            other => Self::Job {
                job: job.clone(),
                reference: reference.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error without any job context.
    pub fn root(&self) -> &SdkError {
        match self {
            Self::Job { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
