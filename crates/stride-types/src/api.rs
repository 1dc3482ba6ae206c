use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ActivityPayload, ActivityStatus, ActivityType, Chat, ChatMessage, ChatType, Connection,
    ConnectionAction, ConnectionStatus, PlanStatus, Profile, ProposalAction, ProposalKind,
    ProposalResponse, ProposalStatus, RaceResult, Role, ScheduledActivity, UserSummary, Workout,
    WorkoutPayload, WorkoutType,
};

// -- JWT Claims --

/// JWT claims issued at login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub token: String,
}

// -- Users & profiles --

/// `sports` and `tags` arrive either as `"run, swim"` or `["run", "swim"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    One(String),
    Many(Vec<String>),
}

impl StringList {
    /// Trimmed, non-empty, first-occurrence-wins list.
    pub fn into_vec(self) -> Vec<String> {
        let raw = match self {
            StringList::One(s) => s.split(',').map(str::to_string).collect(),
            StringList::Many(items) => items,
        };

        let mut out: Vec<String> = Vec::with_capacity(raw.len());
        for item in raw {
            let item = item.trim();
            if !item.is_empty() && !out.iter().any(|seen| seen == item) {
                out.push(item.to_string());
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub sports: Option<StringList>,
    pub tags: Option<StringList>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: UserSummary,
    pub is_self: bool,
    pub connection_status: Option<ConnectionStatus>,
    /// Only present for the owner and accepted connections.
    pub profile: Option<Profile>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Avatar,
    Cover,
}

impl std::str::FromStr for ImageKind {
    type Err = crate::models::UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(ImageKind::Avatar),
            "cover" => Ok(ImageKind::Cover),
            other => Err(crate::models::UnknownVariant {
                kind: "ImageKind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub kind: ImageKind,
    pub url: String,
    pub size: u64,
}

// -- Connections --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConnectionRequest {
    pub recipient_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondConnectionRequest {
    pub action: ConnectionAction,
    /// Compare-and-set guard; stale versions are refused with 409.
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub status: Option<ConnectionStatus>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionView {
    #[serde(flatten)]
    pub connection: Connection,
    pub is_initiator: bool,
    pub counterpart: UserSummary,
}

// -- Activities, workouts, races --

#[derive(Debug, Deserialize)]
pub struct DateRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateActivityRequest {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub duration: Option<i64>,
    pub activity_type: Option<ActivityType>,
    pub status: Option<ActivityStatus>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateActivityRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub duration: Option<i64>,
    pub activity_type: Option<ActivityType>,
    pub status: Option<ActivityStatus>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWorkoutRequest {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<i64>,
    pub rpe: Option<i64>,
    pub workout_type: Option<WorkoutType>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWorkoutRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub duration: Option<i64>,
    pub distance: Option<f64>,
    pub calories: Option<i64>,
    pub rpe: Option<i64>,
    pub workout_type: Option<WorkoutType>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRaceRequest {
    pub event_name: String,
    pub event_type: String,
    pub date: NaiveDate,
    pub finish_time: Option<String>,
    pub distance: Option<f64>,
    pub position: Option<i64>,
    pub total_participants: Option<i64>,
    pub status: Option<PlanStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRaceRequest {
    pub event_name: Option<String>,
    pub event_type: Option<String>,
    pub date: Option<NaiveDate>,
    pub finish_time: Option<String>,
    pub distance: Option<f64>,
    pub position: Option<i64>,
    pub total_participants: Option<i64>,
    pub status: Option<PlanStatus>,
}

// -- Proposals --

#[derive(Debug, Deserialize)]
pub struct ProposeActivityRequest {
    pub proposed_for_id: Uuid,
    pub action: ProposalAction,
    pub original_activity_id: Option<Uuid>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub payload: ActivityPayload,
}

#[derive(Debug, Deserialize)]
pub struct ProposeWorkoutRequest {
    pub proposed_for_id: Uuid,
    pub action: ProposalAction,
    pub original_workout_id: Option<Uuid>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub payload: WorkoutPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalDirection {
    Sent,
    Received,
    #[default]
    All,
}

#[derive(Debug, Deserialize)]
pub struct ProposalQuery {
    #[serde(default)]
    pub direction: ProposalDirection,
    pub status: Option<ProposalStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondProposalRequest {
    pub proposal_id: Uuid,
    pub proposal_type: ProposalKind,
    pub response: ProposalResponse,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RespondProposalResponse {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    /// False when an approved UPDATE/DELETE found its target already gone.
    pub applied: bool,
    pub record_id: Option<Uuid>,
}

// -- Calendar --

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct CalendarRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// One item on a calendar day; the tag tells the client which card to render.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum CalendarEntry {
    Activity(ScheduledActivity),
    Workout(Workout),
    Race(RaceResult),
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub entries: Vec<CalendarEntry>,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChatRequest {
    pub participant_ids: Vec<Uuid>,
    pub chat_type: ChatType,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: Chat,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<ChatMessage>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_list_accepts_both_shapes() {
        let one: StringList = serde_json::from_str("\"running, swimming ,, running\"").unwrap();
        assert_eq!(one.into_vec(), vec!["running", "swimming"]);

        let many: StringList = serde_json::from_str("[\" trail \", \"\", \"road\"]").unwrap();
        assert_eq!(many.into_vec(), vec!["trail", "road"]);
    }

    #[test]
    fn test_propose_activity_request_flattens_payload() {
        let req: ProposeActivityRequest = serde_json::from_str(
            r#"{
                "proposed_for_id": "6f1c2d4e-0000-4000-8000-000000000001",
                "action": "CREATE",
                "title": "Tempo run",
                "start_time": "2024-05-01T07:30:00",
                "end_time": "2024-05-01T08:15:00"
            }"#,
        )
        .unwrap();
        assert_eq!(req.action, ProposalAction::Create);
        assert_eq!(req.payload.title.as_deref(), Some("Tempo run"));
        assert_eq!(req.payload.duration_minutes(), Some(45));
    }

    #[test]
    fn test_calendar_entry_is_tagged_by_kind() {
        let race = RaceResult {
            id: Uuid::nil(),
            owner_id: Uuid::nil(),
            event_name: "City 10K".into(),
            event_type: "10K".into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            finish_time: Some("00:48:12".into()),
            distance: Some(10.0),
            position: None,
            total_participants: None,
            status: PlanStatus::Completed,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(CalendarEntry::Race(race)).unwrap();
        assert_eq!(json["kind"], "race");
        assert_eq!(json["data"]["event_name"], "City 10K");
    }
}
