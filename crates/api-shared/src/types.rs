//! JSON request and response bodies for the admin notification API.

use clinic_core::{
    Notification, NotificationDraft, NotificationKind, NotifyError, NotifyResult, ViewSnapshot,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRes {
    pub id: String,
    /// One of `new_appointment`, `appointment_cancelled`, `info`, `contact_message`.
    pub kind: String,
    pub message: String,
    pub subject_name: String,
    pub occurs_on: String,
    pub slot_time: String,
    /// RFC 3339; absent while the server timestamp is pending.
    pub created_at: Option<String>,
    pub read: bool,
    pub scope: Option<String>,
}

impl From<&Notification> for NotificationRes {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.to_string(),
            kind: n.kind.as_str().to_owned(),
            message: n.message.clone(),
            subject_name: n.subject_name.clone(),
            occurs_on: n.occurs_on.clone(),
            slot_time: n.slot_time.clone(),
            created_at: n.created_at.map(|t| t.to_rfc3339()),
            read: n.read,
            scope: n.scope.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsRes {
    pub notifications: Vec<NotificationRes>,
    pub unread_count: usize,
}

impl From<&ViewSnapshot> for ListNotificationsRes {
    fn from(snapshot: &ViewSnapshot) -> Self {
        Self {
            notifications: snapshot.notifications.iter().map(Into::into).collect(),
            unread_count: snapshot.unread_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScopeUnread {
    /// `None` groups notifications without a scope tag.
    pub scope: Option<String>,
    pub unread: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRes {
    pub total: usize,
    pub unread_count: usize,
    pub unread_by_scope: Vec<ScopeUnread>,
}

impl From<&ViewSnapshot> for SummaryRes {
    fn from(snapshot: &ViewSnapshot) -> Self {
        Self {
            total: snapshot.notifications.len(),
            unread_count: snapshot.unread_count,
            unread_by_scope: snapshot
                .unread_by_scope
                .iter()
                .map(|(scope, unread)| ScopeUnread {
                    scope: scope.clone(),
                    unread: *unread,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationReq {
    pub kind: String,
    pub message: String,
    pub subject_name: String,
    /// `YYYY-MM-DD`
    pub occurs_on: String,
    pub slot_time: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl CreateNotificationReq {
    /// Validates the request into a draft ready for the store.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidInput`] for an unknown kind or any field the draft rejects.
    pub fn to_draft(&self) -> NotifyResult<NotificationDraft> {
        let kind = NotificationKind::parse(&self.kind).ok_or_else(|| {
            NotifyError::InvalidInput(format!("unknown notification kind: {}", self.kind))
        })?;
        NotificationDraft::new(
            kind,
            &self.message,
            &self.subject_name,
            &self.occurs_on,
            &self.slot_time,
            self.scope.as_deref(),
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CreateNotificationRes {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadRes {
    pub marked: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClearAllRes {
    pub deleted: usize,
}
