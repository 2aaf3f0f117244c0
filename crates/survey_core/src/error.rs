use shared::domain::{GroupKey, ImageId};
use thiserror::Error;

use crate::layout::Screen;

/// An action that does not fit the controller's current state. These are
/// caller mistakes, not participant input errors; those go into
/// `ValidationErrors`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("action is not available on the {screen:?} screen")]
    WrongScreen { screen: Screen },
    #[error("'{aid}' is not one of the mobility aids still to evaluate")]
    UnknownMobilityAid { aid: String },
    #[error("image '{image}' does not belong to {group}")]
    ForeignImage { group: GroupKey, image: ImageId },
    #[error("image '{image}' was not offered in this comparison")]
    NotCompared { image: ImageId },
    #[error("'{key}' is a reserved document field and cannot hold a free-form answer")]
    ReservedAnswerKey { key: String },
    #[error("the current step still has unanswered questions")]
    ValidationFailed,
}

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("failed to look up ip address: {source}")]
    IpLookup { source: anyhow::Error },
    #[error("document store request failed: {source}")]
    Store { source: anyhow::Error },
    #[error("failed to send email: {source}")]
    Email { source: anyhow::Error },
    #[error("no resumption link or email address to send it to")]
    MissingResumeLink,
    #[error("invalid resumption link: {0}")]
    Link(#[from] url::ParseError),
}
