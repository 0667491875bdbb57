pub mod archive;
pub mod batch;
pub mod receipt;
pub mod submission;

// Re-export core models for easy access
pub use archive::{
    ArchiveCreationResult, Bundle, CleanupRequest, MemberFailure, SubmissionArchive,
    SubmissionFailureContext, SubmissionMetadata, SubmitRequest,
};
pub use batch::{Batch, BatchKey, BatchMember, WritingBatch};
pub use receipt::{ReceiptedSubmission, SubmittedDataContainer};
pub use submission::{Submission, UserContext};
