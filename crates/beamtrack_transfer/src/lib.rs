pub mod status;
pub mod submission;

pub use status::{days_until_purge, BeamStatus};
pub use submission::{
    submission_error_message, AuthChoice, NewBeamForm, NewBeamRequest, ValidationError,
    SESSION_EXPIRED_MESSAGE,
};
