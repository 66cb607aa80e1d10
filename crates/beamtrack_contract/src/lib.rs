pub mod codec;
pub mod error;
pub mod model;
pub mod query;

pub use codec::{decode_collection, decode_document, encode_document, CodecError};
pub use error::ApiError;
pub use model::{
    AppInfo, AuthMethod, Beam, BeamAlias, BeamFile, BeamId, FileId, Issue, IssueId, StorageSummary,
    StoredKeyId, TagSummary, Tracker, TrackerId, User, UserId, UNKNOWN_USER_PLACEHOLDER,
};
pub use query::{BeamCriteria, FileQuery, PageMeta, PageRequest, PagedResult};
