use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    DocumentId, GeoLocation, GroupKey, ImageId, ScreenSize, SessionId, Side, Step, UserId,
    GROUP_COUNT,
};

/// Number of images a sub-collection needs before it can be compared.
pub const REQUIRED_SELECTION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    #[serde(rename = "temp")]
    Temp,
    #[serde(rename = "CompletedOneMobilityAid")]
    CompletedOneMobilityAid,
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "final")]
    Final,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Temp => "temp",
            LogType::CompletedOneMobilityAid => "CompletedOneMobilityAid",
            LogType::Continue => "continue",
            LogType::Final => "final",
        }
    }
}

/// Every response the participant has given, plus the bookkeeping fields the
/// branching logic reads back on resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answers {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobility_aid_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobility_aid: Option<String>,
    #[serde(default)]
    pub sidewalk_barriers: String,
    #[serde(default)]
    pub ranking: Vec<String>,
    #[serde(default)]
    pub has_dragged: bool,
    #[serde(default)]
    pub answered_mobility_aids: Vec<String>,
    #[serde(default)]
    pub is_group_continue: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Answers {
    /// Records an evaluated aid; the list behaves like an ordered set.
    pub fn mark_aid_answered(&mut self, aid: &str) -> bool {
        if self.answered_mobility_aids.iter().any(|a| a == aid) {
            return false;
        }
        self.answered_mobility_aids.push(aid.to_string());
        true
    }

    pub fn remaining_mobility_aids(&self) -> Vec<String> {
        self.mobility_aid_options
            .iter()
            .filter(|option| !self.answered_mobility_aids.contains(option))
            .cloned()
            .collect()
    }

    pub fn all_aids_answered(&self) -> bool {
        !self.mobility_aid_options.is_empty() && self.remaining_mobility_aids().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSelection {
    #[serde(default)]
    pub a: Vec<ImageId>,
    #[serde(default)]
    pub b: Vec<ImageId>,
}

impl GroupSelection {
    pub fn side(&self, side: Side) -> &[ImageId] {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn is_side_complete(&self, side: Side) -> bool {
        self.side(side).len() >= REQUIRED_SELECTION
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageSelections(BTreeMap<GroupKey, GroupSelection>);

impl Default for ImageSelections {
    fn default() -> Self {
        Self(
            GroupKey::ALL
                .into_iter()
                .map(|key| (key, GroupSelection::default()))
                .collect(),
        )
    }
}

impl ImageSelections {
    pub fn get(&self, group: GroupKey) -> Option<&GroupSelection> {
        self.0.get(&group)
    }

    pub fn set(&mut self, group: GroupKey, selection: GroupSelection) {
        self.0.insert(group, selection);
    }

    /// Images chosen for one side; a group missing from a stored document
    /// counts as empty.
    pub fn images(&self, group: GroupKey, side: Side) -> &[ImageId] {
        self.0
            .get(&group)
            .map(|selection| selection.side(side))
            .unwrap_or(&[])
    }

    pub fn is_side_complete(&self, group: GroupKey, side: Side) -> bool {
        self.images(group, side).len() >= REQUIRED_SELECTION
    }

    pub fn is_group_complete(&self, group: GroupKey) -> bool {
        self.is_side_complete(group, Side::A) && self.is_side_complete(group, Side::B)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageComparison {
    pub group: GroupKey,
    pub side: Side,
    pub context: String,
    pub preferred: ImageId,
    pub other: ImageId,
    pub recorded_at: DateTime<Utc>,
}

/// Randomisation fixed at session creation: the order the groups appear in
/// and the seed used to shuffle each group's image pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub group_order: [GroupKey; GROUP_COUNT],
    pub image_seed: u64,
}

impl SessionPlan {
    pub fn canonical() -> Self {
        Self {
            group_order: GroupKey::ALL,
            image_seed: 0,
        }
    }
}

/// Immutable snapshot written to the document store at each significant
/// transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(flatten)]
    pub answers: Answers,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub current_step: Step,
    pub log_type: LogType,
    #[serde(default)]
    pub image_selections: ImageSelections,
    #[serde(default)]
    pub image_comparisons: Vec<ImageComparison>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<SessionPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_size: Option<ScreenSize>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Document keys owned by `LogRecord` and `Answers`. Free-form answers must
/// not reuse them, since both are flattened into one JSON object.
pub const RESERVED_DOCUMENT_KEYS: &[&str] = &[
    "name",
    "email",
    "mobilityAidOptions",
    "mobilityAid",
    "sidewalkBarriers",
    "ranking",
    "hasDragged",
    "answeredMobilityAids",
    "isGroupContinue",
    "sessionId",
    "userId",
    "currentStep",
    "logType",
    "imageSelections",
    "imageComparisons",
    "plan",
    "ipAddress",
    "userLocation",
    "screenSize",
    "duration",
    "timestamp",
];

pub fn is_reserved_document_key(key: &str) -> bool {
    RESERVED_DOCUMENT_KEYS.contains(&key)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertDocumentResponse {
    pub id: DocumentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalyticsEvent {
    PageView {
        page_title: String,
        page_location: String,
    },
    SurveyStart {
        session_id: SessionId,
        user_id: UserId,
    },
    SurveyComplete {
        session_id: SessionId,
        user_id: UserId,
        duration: f64,
    },
    SurveyExit {
        step: Step,
        timestamp: DateTime<Utc>,
    },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::PageView { .. } => "page_view",
            AnalyticsEvent::SurveyStart { .. } => "survey_start",
            AnalyticsEvent::SurveyComplete { .. } => "survey_complete",
            AnalyticsEvent::SurveyExit { .. } => "survey_exit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to_email: String,
    pub continuation_link: String,
    pub from_name: String,
    pub to_name: String,
}
