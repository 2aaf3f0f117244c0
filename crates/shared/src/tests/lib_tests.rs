use crate::{
    domain::{GroupKey, ImageId, SessionId, Side, Step, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        is_reserved_document_key, Answers, GroupSelection, ImageSelections, LogRecord, LogType,
        SessionPlan,
    },
};

fn sample_record() -> LogRecord {
    let mut answers = Answers {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        mobility_aid_options: vec!["wheelchair".into(), "cane".into()],
        mobility_aid: Some("wheelchair".into()),
        ..Answers::default()
    };
    answers
        .extra
        .insert("favouriteColour".into(), serde_json::json!("teal"));

    LogRecord {
        answers,
        session_id: SessionId::random(),
        user_id: UserId::random(),
        current_step: Step(12),
        log_type: LogType::CompletedOneMobilityAid,
        image_selections: ImageSelections::default(),
        image_comparisons: Vec::new(),
        plan: Some(SessionPlan::canonical()),
        ip_address: Some("203.0.113.7".into()),
        user_location: None,
        screen_size: None,
        duration: 42.5,
        timestamp: None,
    }
}

#[test]
fn group_keys_parse_and_render() {
    let key: GroupKey = "group7".parse().expect("parse");
    assert_eq!(key.index(), 7);
    assert_eq!(key.to_string(), "group7");
    assert_eq!(key.sub_key(Side::B), "group7B");
    assert_eq!(key.comparison_context(Side::A), "group7Acompare");
    assert!("group9".parse::<GroupKey>().is_err());
    assert!("crops1".parse::<GroupKey>().is_err());
}

#[test]
fn log_record_uses_document_field_names() {
    let record = sample_record();
    let value = serde_json::to_value(&record).expect("json");

    assert_eq!(value["logType"], "CompletedOneMobilityAid");
    assert_eq!(value["currentStep"], 12);
    assert_eq!(value["name"], "Ada");
    assert_eq!(value["answeredMobilityAids"], serde_json::json!([]));
    assert_eq!(value["favouriteColour"], "teal");
    assert!(value["imageSelections"]["group0"].is_object());
}

#[test]
fn log_record_keeps_unknown_answer_keys_through_json() {
    let record = sample_record();
    let raw = serde_json::to_string(&record).expect("json");
    let decoded: LogRecord = serde_json::from_str(&raw).expect("decode");

    assert_eq!(decoded.answers.extra.get("favouriteColour"), Some(&serde_json::json!("teal")));
    assert!(!decoded.answers.extra.contains_key("sessionId"));
    assert_eq!(decoded.session_id, record.session_id);
}

#[test]
fn answered_aids_behave_like_a_set() {
    let mut answers = Answers {
        mobility_aid_options: vec!["wheelchair".into(), "cane".into()],
        ..Answers::default()
    };
    assert!(answers.mark_aid_answered("cane"));
    assert!(!answers.mark_aid_answered("cane"));
    assert_eq!(answers.remaining_mobility_aids(), vec!["wheelchair".to_string()]);
    assert!(!answers.all_aids_answered());

    answers.mark_aid_answered("wheelchair");
    assert!(answers.all_aids_answered());
}

#[test]
fn selections_count_missing_groups_as_incomplete() {
    let mut selections: ImageSelections =
        serde_json::from_value(serde_json::json!({})).expect("decode");
    let group = GroupKey::ALL[4];
    assert!(selections.images(group, Side::A).is_empty());
    assert!(!selections.is_group_complete(group));

    selections.set(
        group,
        GroupSelection {
            a: vec![ImageId::from("x"), ImageId::from("y")],
            b: vec![ImageId::from("z")],
        },
    );
    assert!(selections.is_side_complete(group, Side::A));
    assert!(!selections.is_side_complete(group, Side::B));
}

#[test]
fn reserved_keys_cover_every_serialized_record_field() {
    let value = serde_json::to_value(sample_record()).expect("serialize record");
    let object = value.as_object().expect("record is an object");
    for key in object.keys() {
        if key == "favouriteColour" {
            continue;
        }
        assert!(is_reserved_document_key(key), "{key} is not reserved");
    }
    assert!(!is_reserved_document_key("favouriteRoute"));
}

#[test]
fn api_error_displays_code_and_message() {
    let error = ApiError::new(ErrorCode::NotFound, "no such document");
    assert_eq!(error.to_string(), "NotFound: no such document");
    assert!(std::error::Error::source(&error).is_none());
}
