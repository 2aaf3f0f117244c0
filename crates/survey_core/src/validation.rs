use std::{collections::BTreeMap, sync::OnceLock};

use regex::Regex;
use shared::{domain::Step, protocol::Answers};

use crate::layout::{AID_CHOICE_STEP, AID_OPTIONS_STEP, EMAIL_STEP, NAME_STEP, RANK_STEP};

pub const REQUIRED_MESSAGE: &str = "Please fill this in";
pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const NO_OPTION_MESSAGE: &str = "Please select at least one option";
pub const NO_SELECTION_MESSAGE: &str = "Please make a selection";
pub const NOT_RANKED_MESSAGE: &str = "Please rank the options.";

/// Answer fields that can carry an inline error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Name,
    Email,
    MobilityAidOptions,
    MobilityAid,
    HasDragged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn clear(&mut self, field: Field) {
        self.0.remove(&field);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

pub fn is_valid_email(raw: &str) -> bool {
    email_pattern().is_some_and(|pattern| pattern.is_match(raw))
}

/// Checks the answers the given step asks for. Steps without a question
/// always pass.
pub fn validate_step(step: Step, answers: &Answers) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    match step {
        NAME_STEP => {
            if answers.name.trim().is_empty() {
                errors.insert(Field::Name, REQUIRED_MESSAGE);
            }
        }
        EMAIL_STEP => {
            if answers.email.is_empty() {
                errors.insert(Field::Email, REQUIRED_MESSAGE);
            } else if !is_valid_email(&answers.email) {
                errors.insert(Field::Email, INVALID_EMAIL_MESSAGE);
            }
        }
        AID_OPTIONS_STEP => {
            if answers.mobility_aid_options.is_empty() {
                errors.insert(Field::MobilityAidOptions, NO_OPTION_MESSAGE);
            }
        }
        AID_CHOICE_STEP => {
            if answers.mobility_aid.as_deref().map_or(true, str::is_empty) {
                errors.insert(Field::MobilityAid, NO_SELECTION_MESSAGE);
            }
        }
        RANK_STEP => {
            if !answers.has_dragged {
                errors.insert(Field::HasDragged, NOT_RANKED_MESSAGE);
            }
        }
        _ => {}
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern_matches_simple_addresses_only() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("@b.com"));
    }

    #[test]
    fn email_step_distinguishes_missing_from_malformed() {
        let mut answers = Answers::default();
        let errors = validate_step(EMAIL_STEP, &answers);
        assert_eq!(errors.get(Field::Email), Some(REQUIRED_MESSAGE));

        answers.email = "not-an-email".into();
        let errors = validate_step(EMAIL_STEP, &answers);
        assert_eq!(errors.get(Field::Email), Some(INVALID_EMAIL_MESSAGE));

        answers.email = "a@b.com".into();
        assert!(validate_step(EMAIL_STEP, &answers).is_empty());
    }

    #[test]
    fn question_steps_require_their_answer() {
        let answers = Answers::default();
        assert_eq!(
            validate_step(NAME_STEP, &answers).get(Field::Name),
            Some(REQUIRED_MESSAGE)
        );
        assert_eq!(
            validate_step(AID_OPTIONS_STEP, &answers).get(Field::MobilityAidOptions),
            Some(NO_OPTION_MESSAGE)
        );
        assert_eq!(
            validate_step(AID_CHOICE_STEP, &answers).get(Field::MobilityAid),
            Some(NO_SELECTION_MESSAGE)
        );
        assert_eq!(
            validate_step(RANK_STEP, &answers).get(Field::HasDragged),
            Some(NOT_RANKED_MESSAGE)
        );
    }

    #[test]
    fn other_steps_pass_unconditionally() {
        let answers = Answers::default();
        for step in [0, 1, 6, 7, 8, 9, 20, 35, 37, 38, 99] {
            assert!(validate_step(Step(step), &answers).is_empty(), "step {step}");
        }
    }
}
