//! Synchronous survey state machine.
//!
//! The controller owns the step counter and every answer. It decides which
//! screen a step shows and hands back snapshots to persist. It performs no
//! I/O itself; `SurveyClient` turns the returned snapshots into writes.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use shared::{
    domain::{ImageId, ScreenSize, SessionId, Side, Step, UserId, GROUP_COUNT},
    protocol::{
        is_reserved_document_key, Answers, GroupSelection, ImageComparison, ImageSelections,
        LogRecord, LogType, SessionPlan,
    },
};
use tracing::{debug, warn};

use crate::{
    error::ControllerError,
    layout::{
        fixed_screen, Phase, Resolution, Screen, StepLayout, AID_CHOICE_STEP, AID_OPTIONS_STEP,
        BREAK_EVERY, CONTINUE_STEP, FINAL_STEP, INTRO_STEP, MOBILITY_AID_STEP, TOTAL_STEPS,
        WELCOME_STEP,
    },
    resume::resume_step,
    validation::{validate_step, Field, ValidationErrors},
};

/// Screens narrower than this get a small-screen warning.
pub const MIN_COMFORTABLE_WIDTH: u32 = 768;
const MAX_REDIRECTS: usize = TOTAL_STEPS as usize;

/// Source of the current time for snapshot durations.
pub type Clock = fn() -> DateTime<Utc>;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub start_time: Option<DateTime<Utc>>,
    pub screen_size: Option<ScreenSize>,
}

impl SessionInfo {
    pub fn fresh(screen_size: Option<ScreenSize>) -> Self {
        Self {
            session_id: SessionId::random(),
            user_id: UserId::random(),
            start_time: None,
            screen_size,
        }
    }
}

/// A single participant edit. Editing a field clears its inline error.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEdit {
    Name(String),
    Email(String),
    MobilityAidOptions(Vec<String>),
    MobilityAid(String),
    SidewalkBarriers(String),
    Ranking(Vec<String>),
    Other { key: String, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The counter moved forward. The snapshot was taken just before it moved.
    Advanced(Box<LogRecord>),
    /// Validation failed; see `StepController::errors`.
    Rejected,
    /// Already on the last step.
    AtEnd,
}

/// What the participant picked on the continue screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchChoice {
    ContinueNow { next_aid: String },
    ContinueLater,
}

#[derive(Debug, Clone)]
pub struct StepController {
    session: SessionInfo,
    layout: StepLayout,
    current_step: Step,
    answers: Answers,
    image_selections: ImageSelections,
    image_comparisons: Vec<ImageComparison>,
    errors: ValidationErrors,
    single_mobility_aid: bool,
    show_break_overlay: bool,
    breaks_shown: BTreeSet<usize>,
    continue_url: Option<String>,
    show_mobile_warning: bool,
    clock: Clock,
}

impl StepController {
    pub fn new(session: SessionInfo, plan: SessionPlan) -> Self {
        let show_mobile_warning = is_small_screen(session.screen_size);
        Self {
            session,
            layout: StepLayout::new(plan),
            current_step: WELCOME_STEP,
            answers: Answers::default(),
            image_selections: ImageSelections::default(),
            image_comparisons: Vec::new(),
            errors: ValidationErrors::default(),
            single_mobility_aid: false,
            show_break_overlay: false,
            breaks_shown: BTreeSet::new(),
            continue_url: None,
            show_mobile_warning,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Rebuilds a session from a stored record.
    pub fn resume(record: LogRecord, screen_size: Option<ScreenSize>, now: DateTime<Utc>) -> Self {
        let plan = record.plan.clone().unwrap_or_else(SessionPlan::canonical);
        let layout = StepLayout::new(plan.clone());
        let step = resume_step(&layout, &record);

        let mut answers = record.answers;
        if !answers.answered_mobility_aids.is_empty() {
            answers.mobility_aid = answers.remaining_mobility_aids().into_iter().next();
        }
        answers.is_group_continue = false;

        let (image_selections, image_comparisons) = if record.log_type == LogType::Continue {
            (ImageSelections::default(), Vec::new())
        } else {
            (record.image_selections, record.image_comparisons)
        };

        let start_time = Duration::try_milliseconds((record.duration.max(0.0) * 1000.0) as i64)
            .and_then(|elapsed| now.checked_sub_signed(elapsed))
            .unwrap_or_else(|| {
                warn!(duration = record.duration, "stored duration out of range; restarting clock");
                now
            });
        let session = SessionInfo {
            session_id: record.session_id,
            user_id: record.user_id,
            start_time: Some(start_time),
            screen_size: screen_size.or(record.screen_size),
        };

        let mut controller = Self::new(session, plan);
        controller.single_mobility_aid = answers.mobility_aid_options.len() == 1;
        controller.answers = answers;
        controller.image_selections = image_selections;
        controller.image_comparisons = image_comparisons;
        controller.current_step = step;
        controller.settle();
        controller
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub fn layout(&self) -> &StepLayout {
        &self.layout
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn image_selections(&self) -> &ImageSelections {
        &self.image_selections
    }

    pub fn image_comparisons(&self) -> &[ImageComparison] {
        &self.image_comparisons
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn single_mobility_aid(&self) -> bool {
        self.single_mobility_aid
    }

    pub fn show_break_overlay(&self) -> bool {
        self.show_break_overlay
    }

    pub fn show_mobile_warning(&self) -> bool {
        self.show_mobile_warning
    }

    pub fn continue_url(&self) -> Option<&str> {
        self.continue_url.as_deref()
    }

    pub fn progress_percent(&self) -> f64 {
        let step = self.current_step.0.clamp(0, TOTAL_STEPS);
        f64::from(step) / f64::from(TOTAL_STEPS) * 100.0
    }

    /// Blocks whose selection step lies strictly before the current step.
    pub fn completed_blocks(&self) -> usize {
        (0..GROUP_COUNT)
            .filter(|block| self.layout.selection_step(*block) < self.current_step)
            .count()
    }

    pub fn remaining_mobility_aids(&self) -> Vec<String> {
        self.answers.remaining_mobility_aids()
    }

    /// Maps a step to a screen or to the step it must give way to.
    pub fn resolve(&self, step: Step) -> Resolution {
        if !(INTRO_STEP.0..=TOTAL_STEPS).contains(&step.0) {
            return Resolution::Show(Screen::Welcome);
        }
        if step != FINAL_STEP && self.answers.all_aids_answered() {
            return Resolution::Redirect(FINAL_STEP);
        }

        if let Some(slot) = self.layout.slot(step) {
            return match slot.phase {
                Phase::Selection => Resolution::Show(Screen::ImageSelection {
                    block: slot.block,
                    group: slot.group,
                }),
                Phase::Comparison(side) => {
                    if self.image_selections.is_side_complete(slot.group, side) {
                        Resolution::Show(Screen::ImageComparison {
                            block: slot.block,
                            group: slot.group,
                            side,
                        })
                    } else {
                        Resolution::Redirect(match side {
                            Side::A => self.layout.comparison_step(slot.block, Side::B),
                            Side::B => self.layout.after_block(slot.block),
                        })
                    }
                }
            };
        }

        match step {
            AID_CHOICE_STEP if self.single_mobility_aid => Resolution::Redirect(MOBILITY_AID_STEP),
            CONTINUE_STEP if self.branch_is_settled() => Resolution::Redirect(FINAL_STEP),
            _ => Resolution::Show(fixed_screen(step).unwrap_or(Screen::Welcome)),
        }
    }

    /// Screen for the current step, following any pending redirects.
    pub fn screen(&self) -> Screen {
        let mut step = self.current_step;
        for _ in 0..=MAX_REDIRECTS {
            match self.resolve(step) {
                Resolution::Show(screen) => return screen,
                Resolution::Redirect(target) => step = target,
            }
        }
        Screen::Welcome
    }

    /// True when the continue screen has nothing left to offer: only the aid
    /// being evaluated remains.
    fn branch_is_settled(&self) -> bool {
        let options = &self.answers.mobility_aid_options;
        (options.len() == 1 || !self.answers.answered_mobility_aids.is_empty())
            && self.answers.remaining_mobility_aids().len() == 1
    }

    fn settle(&mut self) {
        for _ in 0..=MAX_REDIRECTS {
            match self.resolve(self.current_step) {
                Resolution::Show(screen) => {
                    self.update_break_overlay(screen);
                    return;
                }
                Resolution::Redirect(target) => {
                    debug!(from = %self.current_step, to = %target, "redirecting step");
                    if self.current_step == CONTINUE_STEP && target == FINAL_STEP {
                        self.continue_url = None;
                    }
                    self.current_step = target;
                }
            }
        }
        warn!(step = %self.current_step, "step redirects did not settle");
    }

    fn update_break_overlay(&mut self, screen: Screen) {
        let Screen::ImageSelection { block, .. } = screen else {
            return;
        };
        let eligible = block > 0 && block % BREAK_EVERY == 0 && block + 1 < GROUP_COUNT;
        if eligible && self.breaks_shown.insert(block) {
            debug!(block, "offering break overlay");
            self.show_break_overlay = true;
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.current_step = INTRO_STEP;
        self.session.start_time = Some(now);
        self.settle();
    }

    pub fn next_step(&mut self) -> Transition {
        let errors = validate_step(self.current_step, &self.answers);
        if !errors.is_empty() {
            self.errors = errors;
            return Transition::Rejected;
        }
        self.errors = ValidationErrors::default();

        if self.current_step.0 >= TOTAL_STEPS {
            return Transition::AtEnd;
        }

        let snapshot = self.snapshot(LogType::Temp);
        self.current_step = Step(self.current_step.0 + 1);
        self.settle();
        Transition::Advanced(Box::new(snapshot))
    }

    pub fn previous_step(&mut self) {
        if self.current_step == MOBILITY_AID_STEP && self.single_mobility_aid {
            self.current_step = AID_OPTIONS_STEP;
        } else if self.current_step.0 > INTRO_STEP.0 {
            self.current_step = Step(self.current_step.0 - 1);
        }
        self.settle();
    }

    pub fn set_name(&mut self, name: String) {
        self.answers.name = name;
        self.errors.clear(Field::Name);
    }

    pub fn set_email(&mut self, email: String) {
        self.answers.email = email;
        self.errors.clear(Field::Email);
    }

    /// Duplicates are dropped. A single option is chosen automatically.
    pub fn set_mobility_aid_options(&mut self, options: Vec<String>) {
        let mut options_seen = BTreeSet::new();
        let options: Vec<String> = options
            .into_iter()
            .filter(|option| options_seen.insert(option.clone()))
            .collect();
        self.single_mobility_aid = options.len() == 1;
        if self.single_mobility_aid {
            self.answers.mobility_aid = options.first().cloned();
        } else if let Some(current) = &self.answers.mobility_aid {
            if !options.contains(current) {
                self.answers.mobility_aid = None;
            }
        }
        self.answers.mobility_aid_options = options;
        self.errors.clear(Field::MobilityAidOptions);
    }

    pub fn set_sidewalk_barriers(&mut self, text: String) {
        self.answers.sidewalk_barriers = text;
    }

    pub fn set_ranking(&mut self, order: Vec<String>) {
        self.answers.ranking = order;
        self.answers.has_dragged = true;
        self.errors.clear(Field::HasDragged);
    }

    pub fn edit(&mut self, edit: AnswerEdit) -> Result<(), ControllerError> {
        match edit {
            AnswerEdit::Name(name) => self.set_name(name),
            AnswerEdit::Email(email) => self.set_email(email),
            AnswerEdit::MobilityAidOptions(options) => self.set_mobility_aid_options(options),
            AnswerEdit::MobilityAid(aid) => {
                if !self.answers.mobility_aid_options.contains(&aid) {
                    return Err(ControllerError::UnknownMobilityAid { aid });
                }
                self.answers.mobility_aid = Some(aid);
                self.errors.clear(Field::MobilityAid);
            }
            AnswerEdit::SidewalkBarriers(text) => self.set_sidewalk_barriers(text),
            AnswerEdit::Ranking(order) => self.set_ranking(order),
            AnswerEdit::Other { key, value } => {
                if is_reserved_document_key(&key) {
                    return Err(ControllerError::ReservedAnswerKey { key });
                }
                self.answers.extra.insert(key, value);
            }
        }
        Ok(())
    }

    /// Stores the images picked on a selection screen and moves to the
    /// block's first comparison.
    pub fn complete_selection(
        &mut self,
        group_a: Vec<ImageId>,
        group_b: Vec<ImageId>,
    ) -> Result<LogRecord, ControllerError> {
        let screen = self.screen();
        let Screen::ImageSelection { group, .. } = screen else {
            return Err(ControllerError::WrongScreen { screen });
        };

        self.image_selections.set(
            group,
            GroupSelection {
                a: group_a,
                b: group_b,
            },
        );
        let snapshot = self.snapshot(LogType::Temp);
        self.current_step = Step(self.current_step.0 + 1);
        self.settle();
        Ok(snapshot)
    }

    /// Records which of the two compared images was preferred and moves on.
    pub fn complete_comparison(
        &mut self,
        preferred: ImageId,
        now: DateTime<Utc>,
    ) -> Result<LogRecord, ControllerError> {
        let screen = self.screen();
        let Screen::ImageComparison { group, side, .. } = screen else {
            return Err(ControllerError::WrongScreen { screen });
        };

        let offered = self.image_selections.images(group, side);
        if !offered.contains(&preferred) {
            return Err(ControllerError::NotCompared { image: preferred });
        }
        let other = offered
            .iter()
            .find(|image| **image != preferred)
            .cloned()
            .unwrap_or_else(|| preferred.clone());

        self.image_comparisons.push(ImageComparison {
            group,
            side,
            context: group.comparison_context(side),
            preferred,
            other,
            recorded_at: now,
        });
        let snapshot = self.snapshot(LogType::Temp);
        self.current_step = Step(self.current_step.0 + 1);
        self.settle();
        Ok(snapshot)
    }

    pub fn dismiss_break_overlay(&mut self) {
        self.show_break_overlay = false;
    }

    /// Snapshot for "save and continue later" from inside the image blocks.
    /// Resuming from it lands on the first unfinished block.
    pub fn save_for_later_snapshot(&self) -> LogRecord {
        let mut snapshot = self.snapshot(LogType::Temp);
        snapshot.answers.is_group_continue = true;
        snapshot
    }

    /// Closes the current aid's branch on the continue screen. The returned
    /// snapshot still carries the finished branch's image work; the live
    /// image state is reset afterwards.
    pub fn conclude_aid(&mut self, choice: &BranchChoice) -> Result<LogRecord, ControllerError> {
        let screen = self.screen();
        if screen != Screen::Continue {
            return Err(ControllerError::WrongScreen { screen });
        }

        if let BranchChoice::ContinueNow { next_aid } = choice {
            let current = self.answers.mobility_aid.as_deref();
            let available = self
                .answers
                .remaining_mobility_aids()
                .iter()
                .any(|aid| aid == next_aid && Some(aid.as_str()) != current);
            if !available {
                return Err(ControllerError::UnknownMobilityAid {
                    aid: next_aid.clone(),
                });
            }
        }

        if let Some(aid) = self.answers.mobility_aid.clone() {
            self.answers.mark_aid_answered(&aid);
        }
        let snapshot = self.snapshot(LogType::CompletedOneMobilityAid);
        self.image_selections = ImageSelections::default();
        self.image_comparisons.clear();
        self.breaks_shown.clear();
        self.show_break_overlay = false;

        if let BranchChoice::ContinueNow { next_aid } = choice {
            self.answers.mobility_aid = Some(next_aid.clone());
            self.current_step = MOBILITY_AID_STEP;
            self.settle();
        }
        Ok(snapshot)
    }

    /// Moves to the ending screen, keeping the given resumption link on show.
    pub fn enter_ending(&mut self, continue_url: Option<String>) {
        self.continue_url = continue_url;
        self.current_step = FINAL_STEP;
        self.settle();
    }

    pub fn set_continue_url(&mut self, url: String) {
        self.continue_url = Some(url);
    }

    /// Final submission. Validates the current step and records the aid just
    /// finished before taking the snapshot.
    pub fn final_snapshot(&mut self) -> Result<LogRecord, ControllerError> {
        let screen = self.screen();
        if screen != Screen::Ending {
            return Err(ControllerError::WrongScreen { screen });
        }
        let errors = validate_step(self.current_step, &self.answers);
        if !errors.is_empty() {
            self.errors = errors;
            return Err(ControllerError::ValidationFailed);
        }

        if let Some(aid) = self.answers.mobility_aid.clone() {
            self.answers.mark_aid_answered(&aid);
        }
        Ok(self.snapshot(LogType::Final))
    }

    pub fn snapshot(&self, log_type: LogType) -> LogRecord {
        let duration = self
            .session
            .start_time
            .map(|start| (self.now() - start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        LogRecord {
            answers: self.answers.clone(),
            session_id: self.session.session_id,
            user_id: self.session.user_id,
            current_step: self.current_step,
            log_type,
            image_selections: self.image_selections.clone(),
            image_comparisons: self.image_comparisons.clone(),
            plan: Some(self.layout.plan().clone()),
            ip_address: None,
            user_location: None,
            screen_size: self.session.screen_size,
            duration,
            timestamp: None,
        }
    }
}

fn is_small_screen(size: Option<ScreenSize>) -> bool {
    size.is_some_and(|size| size.width < MIN_COMFORTABLE_WIDTH)
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
