//! The synchronized record, field-level patches, and local validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound (inclusive) of the attendance field.
pub const MAX_ATTENDANCE: u8 = 100;

/// A roster record as stored by the server and mirrored by every client.
///
/// `id` is assigned once and never changes. `last_updated` is stamped by the
/// server on every accepted write; clients never set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable primary key.
    pub id: String,
    /// Roll number within the roster.
    pub roll_number: String,
    /// Display name.
    pub name: String,
    /// Blood group, e.g. `O+`.
    pub blood_group: String,
    /// Class (grade).
    pub class: String,
    /// Section within the class.
    pub section: String,
    /// Contact phone number.
    pub phone: String,
    /// Contact email address.
    pub email: String,
    /// Attendance percentage, 0 to 100 inclusive.
    pub attendance: u8,
    /// ISO-8601 timestamp of the last accepted write.
    pub last_updated: String,
}

impl Record {
    /// Returns a copy of this record with every field set in `patch`
    /// replaced. `last_updated` is left untouched.
    #[must_use]
    pub fn apply_patch(&self, patch: &RecordPatch) -> Record {
        let mut next = self.clone();
        let patch = patch.normalized();

        if let Some(v) = patch.roll_number {
            next.roll_number = v;
        }
        if let Some(v) = patch.name {
            next.name = v;
        }
        if let Some(v) = patch.blood_group {
            next.blood_group = v;
        }
        if let Some(v) = patch.class {
            next.class = v;
        }
        if let Some(v) = patch.section {
            next.section = v;
        }
        if let Some(v) = patch.phone {
            next.phone = v;
        }
        if let Some(v) = patch.email {
            next.email = v;
        }
        if let Some(v) = patch.attendance {
            next.attendance = v;
        }

        next
    }

    /// Returns the current value of an editable field, rendered as text.
    #[must_use]
    pub fn field_value(&self, field: EditableField) -> String {
        match field {
            EditableField::RollNumber => self.roll_number.clone(),
            EditableField::Name => self.name.clone(),
            EditableField::BloodGroup => self.blood_group.clone(),
            EditableField::Class => self.class.clone(),
            EditableField::Section => self.section.clone(),
            EditableField::Phone => self.phone.clone(),
            EditableField::Email => self.email.clone(),
            EditableField::Attendance => self.attendance.to_string(),
        }
    }
}

/// The fields a client may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditableField {
    /// `rollNumber`
    RollNumber,
    /// `name`
    Name,
    /// `bloodGroup`
    BloodGroup,
    /// `class`
    Class,
    /// `section`
    Section,
    /// `phone`
    Phone,
    /// `email`
    Email,
    /// `attendance`
    Attendance,
}

impl EditableField {
    /// All editable fields, in display order.
    pub const ALL: [EditableField; 8] = [
        EditableField::RollNumber,
        EditableField::Name,
        EditableField::BloodGroup,
        EditableField::Class,
        EditableField::Section,
        EditableField::Phone,
        EditableField::Email,
        EditableField::Attendance,
    ];

    /// Returns the wire name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EditableField::RollNumber => "rollNumber",
            EditableField::Name => "name",
            EditableField::BloodGroup => "bloodGroup",
            EditableField::Class => "class",
            EditableField::Section => "section",
            EditableField::Phone => "phone",
            EditableField::Email => "email",
            EditableField::Attendance => "attendance",
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditableField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EditableField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::unknown_field(s))
    }
}

/// A local validation failure. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The offending field, if the failure is field-scoped.
    pub field: Option<EditableField>,
    /// Human-readable reason.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => write!(f, "patch: {}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Creates a field-scoped validation error.
    pub fn new(field: EditableField, message: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            message: message.into(),
        }
    }

    fn empty_patch() -> Self {
        Self {
            field: None,
            message: "patch does not change any field".into(),
        }
    }

    fn unknown_field(name: &str) -> Self {
        Self {
            field: None,
            message: format!("unknown field '{}'", name.trim()),
        }
    }
}

/// A partial update to a record. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    /// New roll number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    /// New name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New blood group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<String>,
    /// New class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// New section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// New phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// New email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New attendance percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<u8>,
}

impl RecordPatch {
    /// Builds a single-field patch from raw user input.
    ///
    /// Text fields are trimmed; attendance must be an integer in `0..=100`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] scoped to `field` if the input is
    /// rejected.
    pub fn field(field: EditableField, raw: &str) -> Result<Self, ValidationError> {
        let mut patch = RecordPatch::default();

        if field == EditableField::Attendance {
            patch.attendance = Some(parse_attendance(raw)?);
            return Ok(patch);
        }

        let value = validate_text(field, raw)?;
        match field {
            EditableField::RollNumber => patch.roll_number = Some(value),
            EditableField::Name => patch.name = Some(value),
            EditableField::BloodGroup => patch.blood_group = Some(value),
            EditableField::Class => patch.class = Some(value),
            EditableField::Section => patch.section = Some(value),
            EditableField::Phone => patch.phone = Some(value),
            EditableField::Email => patch.email = Some(value),
            EditableField::Attendance => {}
        }
        Ok(patch)
    }

    /// Returns the fields this patch touches.
    #[must_use]
    pub fn fields(&self) -> Vec<EditableField> {
        self.text_values()
            .into_iter()
            .filter_map(|(field, value)| value.map(|_| field))
            .chain(self.attendance.map(|_| EditableField::Attendance))
            .collect()
    }

    /// Returns true if the patch touches no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Validates every set field.
    ///
    /// # Errors
    ///
    /// Returns the first failing field, or a patch-level error when the
    /// patch is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::empty_patch());
        }

        for (field, value) in self.text_values() {
            if let Some(value) = value {
                validate_text(field, value)?;
            }
        }

        if let Some(attendance) = self.attendance {
            if attendance > MAX_ATTENDANCE {
                return Err(attendance_out_of_range());
            }
        }

        Ok(())
    }

    /// Returns a copy with every text value trimmed.
    #[must_use]
    pub fn normalized(&self) -> RecordPatch {
        let trim = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string());
        RecordPatch {
            roll_number: trim(&self.roll_number),
            name: trim(&self.name),
            blood_group: trim(&self.blood_group),
            class: trim(&self.class),
            section: trim(&self.section),
            phone: trim(&self.phone),
            email: trim(&self.email),
            attendance: self.attendance,
        }
    }

    fn text_values(&self) -> [(EditableField, Option<&String>); 7] {
        [
            (EditableField::RollNumber, self.roll_number.as_ref()),
            (EditableField::Name, self.name.as_ref()),
            (EditableField::BloodGroup, self.blood_group.as_ref()),
            (EditableField::Class, self.class.as_ref()),
            (EditableField::Section, self.section.as_ref()),
            (EditableField::Phone, self.phone.as_ref()),
            (EditableField::Email, self.email.as_ref()),
        ]
    }
}

fn attendance_out_of_range() -> ValidationError {
    ValidationError::new(
        EditableField::Attendance,
        format!("attendance must be between 0 and {MAX_ATTENDANCE}"),
    )
}

fn parse_attendance(raw: &str) -> Result<u8, ValidationError> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        ValidationError::new(EditableField::Attendance, "attendance must be a number")
    })?;

    if !(0..=i64::from(MAX_ATTENDANCE)).contains(&value) {
        return Err(attendance_out_of_range());
    }

    // Range checked above.
    Ok(value as u8)
}

fn validate_text(field: EditableField, raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, format!("{field} must not be empty")));
    }

    if field == EditableField::Email && !looks_like_email(value) {
        return Err(ValidationError::new(field, "email must look like name@domain"));
    }

    Ok(value.to_string())
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !value.contains(char::is_whitespace)
        }
        _ => false,
    }
}
