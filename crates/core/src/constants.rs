//! Constants used throughout the clinic core crate.
//!
//! Field names follow the document layout written by the booking and contact-form workflows, so
//! they are the wire names of the `notifications` collection rather than Rust field names.

/// Document field holding the notification kind.
pub const FIELD_KIND: &str = "type";

/// Document field holding the free-text message.
pub const FIELD_MESSAGE: &str = "message";

/// Document field holding the display name of the person concerned.
pub const FIELD_SUBJECT_NAME: &str = "patientName";

/// Document field holding the calendar date (`YYYY-MM-DD`) of the event being notified about.
pub const FIELD_OCCURS_ON: &str = "date";

/// Document field holding the human-readable time slot label.
pub const FIELD_SLOT_TIME: &str = "time";

/// Document field holding the server-assigned creation timestamp.
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Document field holding the read flag.
pub const FIELD_READ: &str = "read";

/// Document field holding the department / purpose tag.
pub const FIELD_SCOPE: &str = "scope";

/// Date format of [`FIELD_OCCURS_ON`].
pub const OCCURS_ON_FORMAT: &str = "%Y-%m-%d";

/// Default REST listen address when `CLINIC_REST_ADDR` is not set.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Capacity of the command channel feeding a reconciler task.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;
