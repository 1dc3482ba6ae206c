use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Duration in minutes used when a proposal or request does not carry one.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Longest activity or workout, in minutes.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Longest title an activity, workout or proposal may carry.
pub const MAX_TITLE_CHARS: usize = 200;

/// Returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enum stored as TEXT in SQLite and serialized with the same spelling.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum!(Role {
    Athlete => "ATHLETE",
    Coach => "COACH",
    Professional => "PROFESSIONAL",
    Admin => "ADMIN",
});

impl Role {
    /// Roles allowed to author proposals for connected athletes.
    pub fn can_propose(self) -> bool {
        matches!(self, Role::Coach | Role::Professional | Role::Admin)
    }
}

string_enum!(ConnectionStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

string_enum!(
    /// Recipient's answer to a pending connection request.
    ConnectionAction {
        Accept => "accept",
        Reject => "reject",
    }
);

impl ConnectionStatus {
    /// PENDING and ACCEPTED rows occupy the pair; REJECTED ones do not.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionStatus::Pending | ConnectionStatus::Accepted)
    }

    /// Next status after a response, or `None` if the connection was already answered.
    pub fn respond(self, action: ConnectionAction) -> Option<ConnectionStatus> {
        match self {
            ConnectionStatus::Pending => Some(match action {
                ConnectionAction::Accept => ConnectionStatus::Accepted,
                ConnectionAction::Reject => ConnectionStatus::Rejected,
            }),
            ConnectionStatus::Accepted | ConnectionStatus::Rejected => None,
        }
    }
}

string_enum!(ActivityStatus {
    Scheduled => "SCHEDULED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

string_enum!(
    /// Lifecycle of workouts and race results.
    PlanStatus {
        Planned => "PLANNED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
);

string_enum!(ActivityType {
    Training => "TRAINING",
    Running => "RUNNING",
    Cycling => "CYCLING",
    Swimming => "SWIMMING",
    Strength => "STRENGTH",
    Recovery => "RECOVERY",
    Meeting => "MEETING",
    Other => "OTHER",
});

string_enum!(WorkoutType {
    Running => "RUNNING",
    Cycling => "CYCLING",
    Swimming => "SWIMMING",
    Strength => "STRENGTH",
    Hiit => "HIIT",
    Mobility => "MOBILITY",
    Other => "OTHER",
});

string_enum!(ProposalAction {
    Create => "CREATE",
    Update => "UPDATE",
    Delete => "DELETE",
});

impl ProposalAction {
    /// UPDATE and DELETE point at an existing record.
    pub fn needs_original(self) -> bool {
        !matches!(self, ProposalAction::Create)
    }
}

string_enum!(ProposalStatus {
    PendingApproval => "PENDING_APPROVAL",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

string_enum!(ProposalResponse {
    Approve => "approve",
    Reject => "reject",
});

impl ProposalStatus {
    /// Approved and rejected proposals are terminal.
    pub fn respond(self, response: ProposalResponse) -> Option<ProposalStatus> {
        match self {
            ProposalStatus::PendingApproval => Some(match response {
                ProposalResponse::Approve => ProposalStatus::Approved,
                ProposalResponse::Reject => ProposalStatus::Rejected,
            }),
            ProposalStatus::Approved | ProposalStatus::Rejected => None,
        }
    }
}

string_enum!(ProposalKind {
    Activity => "activity",
    Workout => "workout",
});

string_enum!(ChatType {
    Direct => "DIRECT",
    Group => "GROUP",
});

string_enum!(MessageStatus {
    Sent => "SENT",
    Delivered => "DELIVERED",
    Read => "READ",
});

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// What other users get to see about someone without a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub bio: Option<String>,
    pub location: Option<String>,
    pub sports: Vec<String>,
    pub tags: Vec<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

// -- Connections --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub recipient_id: Uuid,
    pub status: ConnectionStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.initiator_id == user_id || self.recipient_id == user_id
    }

    /// The other side of the connection as seen by `user_id`.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.initiator_id == user_id {
            self.recipient_id
        } else {
            self.initiator_id
        }
    }
}

/// Orders two user ids so an unordered pair has one canonical key.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

// -- Calendar entities --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledActivity {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration: i64,
    pub activity_type: ActivityType,
    pub status: ActivityStatus,
    pub location: Option<String>,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workout {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub duration: i64,
    pub distance: Option<f64>,
    pub calories: Option<i64>,
    pub rpe: Option<i64>,
    pub workout_type: WorkoutType,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceResult {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub event_name: String,
    pub event_type: String,
    pub date: NaiveDate,
    pub finish_time: Option<String>,
    pub distance: Option<f64>,
    pub position: Option<i64>,
    pub total_participants: Option<i64>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Proposals --

/// Fields a coach proposes for an athlete's scheduled activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub activity_type: Option<ActivityType>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub location: Option<String>,
}

impl ActivityPayload {
    /// Start-of-day used when the proposal carries no start time.
    pub fn default_start() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
    }

    /// Minutes between start and end, rounded to the nearest minute.
    pub fn duration_minutes(&self) -> Option<i64> {
        let (start, end) = (self.start_time?, self.end_time?);
        let millis = (end - start).num_milliseconds();
        Some((millis as f64 / 60_000.0).round() as i64)
    }

    pub fn date_or(&self, fallback: NaiveDate) -> NaiveDate {
        self.start_time.map(|t| t.date()).unwrap_or(fallback)
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.start_time.map(|t| t.time())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkoutPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub workout_type: Option<WorkoutType>,
    pub date: Option<NaiveDate>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityProposal {
    pub id: Uuid,
    pub action: ProposalAction,
    pub status: ProposalStatus,
    pub proposed_by_id: Uuid,
    pub proposed_for_id: Uuid,
    pub original_activity_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: ActivityPayload,
    pub notes: Option<String>,
    pub response_notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutProposal {
    pub id: Uuid,
    pub action: ProposalAction,
    pub status: ProposalStatus,
    pub proposed_by_id: Uuid,
    pub proposed_for_id: Uuid,
    pub original_workout_id: Option<Uuid>,
    #[serde(flatten)]
    pub payload: WorkoutPayload,
    pub notes: Option<String>,
    pub response_notes: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// -- Chat --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_enum_round_trip_through_text() {
        assert_eq!("PENDING_APPROVAL".parse::<ProposalStatus>().unwrap(), ProposalStatus::PendingApproval);
        assert_eq!(WorkoutType::Hiit.as_str(), "HIIT");
        let err = "MAYBE".parse::<ConnectionStatus>().unwrap_err();
        assert_eq!(err.kind, "ConnectionStatus");
        assert_eq!(
            serde_json::to_string(&ProposalResponse::Approve).unwrap(),
            "\"approve\""
        );
    }

    #[test]
    fn test_connection_transitions() {
        assert_eq!(
            ConnectionStatus::Pending.respond(ConnectionAction::Accept),
            Some(ConnectionStatus::Accepted)
        );
        assert_eq!(
            ConnectionStatus::Pending.respond(ConnectionAction::Reject),
            Some(ConnectionStatus::Rejected)
        );
        assert_eq!(ConnectionStatus::Accepted.respond(ConnectionAction::Reject), None);
        assert_eq!(ConnectionStatus::Rejected.respond(ConnectionAction::Accept), None);
        assert!(!ConnectionStatus::Rejected.is_live());
    }

    #[test]
    fn test_proposal_transitions_are_terminal() {
        assert_eq!(
            ProposalStatus::PendingApproval.respond(ProposalResponse::Approve),
            Some(ProposalStatus::Approved)
        );
        assert_eq!(ProposalStatus::Approved.respond(ProposalResponse::Reject), None);
        assert_eq!(ProposalStatus::Rejected.respond(ProposalResponse::Approve), None);
    }

    #[test]
    fn test_only_coaching_roles_propose() {
        assert!(!Role::Athlete.can_propose());
        assert!(Role::Coach.can_propose());
        assert!(Role::Professional.can_propose());
        assert!(Role::Admin.can_propose());
    }

    #[test]
    fn test_activity_duration_rounds_to_minutes() {
        let payload = ActivityPayload {
            start_time: Some(at(9, 0, 0)),
            end_time: Some(at(9, 45, 31)),
            ..Default::default()
        };
        assert_eq!(payload.duration_minutes(), Some(46));

        let payload = ActivityPayload {
            start_time: Some(at(9, 0, 0)),
            end_time: Some(at(9, 45, 29)),
            ..Default::default()
        };
        assert_eq!(payload.duration_minutes(), Some(45));

        let open_ended = ActivityPayload {
            start_time: Some(at(9, 0, 0)),
            ..Default::default()
        };
        assert_eq!(open_ended.duration_minutes(), None);
    }

    #[test]
    fn test_ordered_pair_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ordered_pair(a, b), ordered_pair(b, a));
    }
}
