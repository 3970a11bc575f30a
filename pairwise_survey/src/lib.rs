/*!
Response engine for most/least pairwise-comparison surveys.

In every section of a survey, the respondent picks the most and the least
challenging item, then rates the most challenging item against every other
item and every remaining item against the least challenging one. This crate
holds everything that does not depend on a user interface:

- [`SchemaRegistry`]: indices over an immutable survey definition,
- [`comparison_matrix`]: which comparisons a pair of extremes implies,
- [`SectionMachine`]: the selection / comparison / edit workflow of a section,
- [`SurveySession`]: the state of one respondent, saved progress and submission,
- [`normalize_responses`]: mapping of older answers onto the current definition,
- [`validate_value`]: checks of a submission against the definition it embeds.

See the [`manual`] for the document formats.
*/

mod config;
mod machine;
mod matrix;
mod normalize;
mod payload;
mod registry;
mod session;
mod state;
mod store;
mod submit;
mod validate;

pub mod builder;
pub mod manual;

pub use crate::config::*;
pub use crate::machine::{SectionMachine, SectionPhase, TransitionError};
pub use crate::matrix::{
    comparison_matrix, comparison_questions, others_for_least, others_for_most, ComparisonMatrix,
    ComparisonQuestion, MatrixError,
};
pub use crate::normalize::{
    normalize_responses, NormalizationWarning, NormalizedResponses, NoteSeverity,
};
pub use crate::payload::{
    fingerprint, iso_timestamp, loose_respondent, ExportBlob, IncomingPayload, LegacyPayload,
    ProgressBlob, SubmissionPayload,
};
pub use crate::registry::{
    normalize_label, LabelCollision, MatchKind, Resolved, SchemaError, SchemaRegistry,
};
pub use crate::session::{Gap, Page, RestoredSession, SessionError, SurveySession};
pub use crate::state::{EditBaseline, SectionResponseState};
pub use crate::store::{
    backup_key, BlobStore, MemoryStore, StoreError, BACKUP_KEY_PREFIX, LEGACY_PROGRESS_KEY,
    PROGRESS_KEY,
};
pub use crate::submit::{
    SinkResponse, SubmissionReceipt, SubmitError, Transport, TransportFailure, UnreachableSnafu,
    UnreadableResponseSnafu,
};
pub use crate::validate::{schema_version, validate_submission, validate_value, ValidationError};
