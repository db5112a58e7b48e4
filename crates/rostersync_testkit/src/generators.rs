//! Property-based test generators using proptest.
//!
//! Provides strategies for records and patches that pass validation, plus
//! raw field input that must be rejected.

use proptest::prelude::*;
use rostersync_protocol::{EditableField, GlobalVersion, Record, RecordPatch, MAX_ATTENDANCE};

/// Strategy for a global version.
pub fn arb_version() -> impl Strategy<Value = GlobalVersion> {
    (1u64..10_000).prop_map(GlobalVersion)
}

/// Strategy for an editable field.
pub fn arb_field() -> impl Strategy<Value = EditableField> {
    prop::sample::select(EditableField::ALL.to_vec())
}

fn arb_text() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 .+-]{0,23}").expect("Invalid regex")
}

/// Strategy for a record whose fields all pass validation.
pub fn arb_record() -> impl Strategy<Value = Record> {
    (
        1u32..1000,
        arb_text(),
        prop::sample::select(vec!["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"]),
        1u8..=12,
        prop::sample::select(vec!["A", "B", "C", "D"]),
        0u8..=MAX_ATTENDANCE,
    )
        .prop_map(|(n, name, blood_group, class, section, attendance)| Record {
            id: format!("stu-{n:03}"),
            roll_number: format!("R{n:03}"),
            name,
            blood_group: blood_group.to_string(),
            class: class.to_string(),
            section: section.to_string(),
            phone: format!("555-{:04}", n),
            email: format!("student{n}@example.edu"),
            attendance,
            last_updated: "2024-01-15T08:00:00.000Z".into(),
        })
}

/// Strategy for a non-empty patch that passes validation.
pub fn arb_patch() -> impl Strategy<Value = RecordPatch> {
    (
        prop::option::of(arb_text()),
        prop::option::of(arb_text()),
        prop::option::of(0u8..=MAX_ATTENDANCE),
    )
        .prop_filter("patch must touch a field", |(name, section, attendance)| {
            name.is_some() || section.is_some() || attendance.is_some()
        })
        .prop_map(|(name, section, attendance)| RecordPatch {
            name,
            section,
            attendance,
            ..RecordPatch::default()
        })
}

/// Strategy for raw attendance input that must be rejected.
pub fn arb_invalid_attendance() -> impl Strategy<Value = String> {
    prop_oneof![
        ((MAX_ATTENDANCE as u32 + 1)..100_000).prop_map(|n| n.to_string()),
        (1i32..1000).prop_map(|n| format!("-{n}")),
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        Just(String::new()),
    ]
}
