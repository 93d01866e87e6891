//! Notification records and the parse step at the document-store boundary.
//!
//! Documents in the `notifications` collection are untyped maps written by several workflows
//! (appointment booking, cancellations, the public contact form). Every field may be missing or
//! carry an unexpected type. [`Notification::from_document`] is the single place where such a
//! map becomes a typed record: missing or malformed fields fall back to defaults and are logged,
//! so one bad document never takes down a subscription.
//!
//! [`Notification::to_fields`] writes the record back in the same layout, so a record read from
//! the store and written back loses nothing except defaulted optional fields.

use crate::constants::{
    FIELD_CREATED_AT, FIELD_KIND, FIELD_MESSAGE, FIELD_OCCURS_ON, FIELD_READ, FIELD_SCOPE,
    FIELD_SLOT_TIME, FIELD_SUBJECT_NAME, OCCURS_ON_FORMAT,
};
use crate::error::{NotifyError, NotifyResult};
use crate::store::{Document, Fields};
use chrono::{DateTime, NaiveDate, Utc};
use clinic_types::{DocumentId, NonEmptyText};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What happened, from the point of view of the admin being notified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewAppointment,
    AppointmentCancelled,
    Info,
    ContactMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAppointment => "new_appointment",
            Self::AppointmentCancelled => "appointment_cancelled",
            Self::Info => "info",
            Self::ContactMessage => "contact_message",
        }
    }

    /// Parses a kind tag, ignoring case and `-`/`_`/space separators.
    pub fn parse(s: &str) -> Option<Self> {
        let normalised: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalised.as_str() {
            "newappointment" | "appointment" => Some(Self::NewAppointment),
            "appointmentcancelled" | "cancelledappointment" | "cancellation" => {
                Some(Self::AppointmentCancelled)
            }
            "info" => Some(Self::Info),
            "contactmessage" | "contact" | "message" => Some(Self::ContactMessage),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinic departments with their own admin views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    ClinicalLaboratory,
    Dental,
    Medical,
    Radiology,
}

impl Department {
    pub const ALL: [Department; 4] = [
        Department::ClinicalLaboratory,
        Department::Dental,
        Department::Medical,
        Department::Radiology,
    ];

    /// The value stored in a notification's `scope` field for this department.
    pub fn scope_tag(&self) -> &'static str {
        match self {
            Self::ClinicalLaboratory => "laboratory",
            Self::Dental => "dental",
            Self::Medical => "medical",
            Self::Radiology => "radiology",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ClinicalLaboratory => "Clinical Laboratory",
            Self::Dental => "Dental",
            Self::Medical => "Medical",
            Self::Radiology => "Radiology",
        }
    }

    /// Parses either a scope tag or a display name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Self::ALL.into_iter().find(|d| {
            d.scope_tag().eq_ignore_ascii_case(wanted)
                || d.display_name().eq_ignore_ascii_case(wanted)
        })
    }
}

/// A typed notification as held in the reconciler's materialized list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: DocumentId,
    pub kind: NotificationKind,
    pub message: String,
    pub subject_name: String,
    /// Date of the event being notified about, not of the notification itself.
    pub occurs_on: String,
    pub slot_time: String,
    /// `None` while the server timestamp is still pending or when the field is unusable.
    pub created_at: Option<DateTime<Utc>>,
    pub read: bool,
    pub scope: Option<String>,
}

impl Notification {
    /// Builds a typed record from a store document, defaulting anything missing or malformed.
    pub fn from_document(doc: &Document) -> Self {
        let fields = &doc.fields;
        let id = &doc.id;

        let kind = match fields.get(FIELD_KIND) {
            Some(Value::String(s)) => NotificationKind::parse(s).unwrap_or_else(|| {
                tracing::warn!("notification {}: unknown kind {:?}, using info", id, s);
                NotificationKind::Info
            }),
            Some(other) => {
                tracing::warn!("notification {}: non-string kind {}, using info", id, other);
                NotificationKind::Info
            }
            None => NotificationKind::Info,
        };

        let created_at = match fields.get(FIELD_CREATED_AT) {
            None | Some(Value::Null) => None,
            Some(v) => {
                let parsed = parse_timestamp(v);
                if parsed.is_none() {
                    tracing::warn!("notification {}: unreadable createdAt {}", id, v);
                }
                parsed
            }
        };

        Self {
            id: id.clone(),
            kind,
            message: string_field(fields, FIELD_MESSAGE),
            subject_name: string_field(fields, FIELD_SUBJECT_NAME),
            occurs_on: string_field(fields, FIELD_OCCURS_ON),
            slot_time: string_field(fields, FIELD_SLOT_TIME),
            created_at,
            read: read_flag(fields),
            scope: scope_field(fields),
        }
    }

    /// Writes the record back in the collection's document layout.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_KIND.into(), json!(self.kind.as_str()));
        fields.insert(FIELD_MESSAGE.into(), json!(self.message));
        fields.insert(FIELD_SUBJECT_NAME.into(), json!(self.subject_name));
        fields.insert(FIELD_OCCURS_ON.into(), json!(self.occurs_on));
        fields.insert(FIELD_SLOT_TIME.into(), json!(self.slot_time));
        fields.insert(
            FIELD_CREATED_AT.into(),
            self.created_at.map(timestamp_value).unwrap_or(Value::Null),
        );
        fields.insert(FIELD_READ.into(), json!(self.read));
        if let Some(scope) = &self.scope {
            fields.insert(FIELD_SCOPE.into(), json!(scope));
        }
        fields
    }

    pub fn to_document(&self) -> Document {
        Document {
            id: self.id.clone(),
            fields: self.to_fields(),
        }
    }

    pub fn department(&self) -> Option<Department> {
        self.scope.as_deref().and_then(Department::parse)
    }
}

/// A notification about to be created by a workflow. The store assigns `id` and `createdAt`.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub message: NonEmptyText,
    pub subject_name: NonEmptyText,
    pub occurs_on: NaiveDate,
    pub slot_time: String,
    pub scope: Option<String>,
}

impl NotificationDraft {
    /// Validates raw workflow input.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidInput`] if the message or subject name is blank, the date is
    /// not `YYYY-MM-DD`, or the scope tag is not a safe identifier.
    pub fn new(
        kind: NotificationKind,
        message: &str,
        subject_name: &str,
        occurs_on: &str,
        slot_time: &str,
        scope: Option<&str>,
    ) -> NotifyResult<Self> {
        let message = NonEmptyText::new(message)
            .map_err(|_| NotifyError::InvalidInput("message cannot be empty".into()))?;
        let subject_name = NonEmptyText::new(subject_name)
            .map_err(|_| NotifyError::InvalidInput("subject name cannot be empty".into()))?;
        let occurs_on = NaiveDate::parse_from_str(occurs_on.trim(), OCCURS_ON_FORMAT)
            .map_err(|_| {
                NotifyError::InvalidInput(format!("date must be YYYY-MM-DD, got {:?}", occurs_on))
            })?;
        let scope = match scope.map(str::trim).filter(|s| !s.is_empty()) {
            Some(tag) => {
                crate::config::validate_scope_tag(tag)?;
                Some(tag.to_owned())
            }
            None => None,
        };

        Ok(Self {
            kind,
            message,
            subject_name,
            occurs_on,
            slot_time: slot_time.trim().to_owned(),
            scope,
        })
    }

    /// Fields for a new document. `createdAt` is left out so the store stamps it.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_KIND.into(), json!(self.kind.as_str()));
        fields.insert(FIELD_MESSAGE.into(), json!(self.message.as_str()));
        fields.insert(FIELD_SUBJECT_NAME.into(), json!(self.subject_name.as_str()));
        fields.insert(
            FIELD_OCCURS_ON.into(),
            json!(self.occurs_on.format(OCCURS_ON_FORMAT).to_string()),
        );
        fields.insert(FIELD_SLOT_TIME.into(), json!(self.slot_time));
        fields.insert(FIELD_READ.into(), json!(false));
        if let Some(scope) = &self.scope {
            fields.insert(FIELD_SCOPE.into(), json!(scope));
        }
        fields
    }
}

/// Reads the `read` flag. Anything other than a boolean `true` counts as unread.
pub fn read_flag(fields: &Fields) -> bool {
    matches!(fields.get(FIELD_READ), Some(Value::Bool(true)))
}

/// Patch setting `read` to the given value.
pub fn read_patch(read: bool) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_READ.into(), json!(read));
    fields
}

/// Parses a stored timestamp.
///
/// Accepts the `{ "seconds", "nanoseconds" }` object the store writes, an RFC 3339 string, or
/// integer milliseconds since the epoch.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Serialises a timestamp the way the store stores server timestamps.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    json!({
        "seconds": at.timestamp(),
        "nanoseconds": at.timestamp_subsec_nanos(),
    })
}

fn string_field(fields: &Fields, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn scope_field(fields: &Fields) -> Option<String> {
    match fields.get(FIELD_SCOPE) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}
