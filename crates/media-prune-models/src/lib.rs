pub mod job;
pub mod media;
pub mod media_ids;
pub mod records;

pub use job::{DeletedItem, DeletionCandidate, Job, JobStatus, JobSummary, ReconcileReport, SyncKind};
pub use media::{Exclusion, MediaItem, MediaType, Requester, RuleSource, SymlinkState, WatchState};
pub use media_ids::MediaIds;
pub use records::{
    BridgeStatus, HistoryRecord, ManagedEntry, MediaRequest, Page, PageRequest, ServerItem, SymlinkEntry,
    SymlinkRequest, VirtualFolder,
};
