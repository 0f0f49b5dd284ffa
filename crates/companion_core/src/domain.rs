//! crates/companion_core/src/domain.rs
//!
//! Defines the core data structures for the companion chat.
//! These types carry no I/O; they derive `serde` so the persisted bundle and
//! the web layer can share them without a mapping layer.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// Persona Modes and Messages
//=========================================================================================

/// A named conversational personality with its own instruction set, thread and
/// response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaMode {
    #[default]
    Companion,
    Counselor,
    Live,
    Artist,
    Chef,
    Dj,
    Coding,
}

impl PersonaMode {
    pub const ALL: [PersonaMode; 7] = [
        PersonaMode::Companion,
        PersonaMode::Counselor,
        PersonaMode::Live,
        PersonaMode::Artist,
        PersonaMode::Chef,
        PersonaMode::Dj,
        PersonaMode::Coding,
    ];

    /// The identifier used in URLs and in the persisted bundle.
    pub fn as_str(self) -> &'static str {
        match self {
            PersonaMode::Companion => "companion",
            PersonaMode::Counselor => "counselor",
            PersonaMode::Live => "live",
            PersonaMode::Artist => "artist",
            PersonaMode::Chef => "chef",
            PersonaMode::Dj => "dj",
            PersonaMode::Coding => "coding",
        }
    }
}

impl std::fmt::Display for PersonaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PersonaMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown persona mode '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// A single chat message. Immutable once created; threads are only appended to
/// or truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_payload: Option<StructuredPayload>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            image_url: None,
            structured_payload: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Assistant)
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_payload(mut self, payload: StructuredPayload) -> Self {
        self.structured_payload = Some(payload);
        self
    }

    pub fn is_from_user(&self) -> bool {
        self.sender == Sender::User
    }
}

//=========================================================================================
// Structured Payloads
//=========================================================================================

/// A non-text response rendered through a specialized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StructuredPayload {
    Recipe(Recipe),
    Playlist(Playlist),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub recipe_name: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub playlist_name: String,
    pub description: String,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
}

/// The two-field reply the counselor persona is instructed to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselorReply {
    pub response_text: String,
    #[serde(default)]
    pub anxiety_detected: bool,
}

//=========================================================================================
// User Profile
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "Masculino")]
    Male,
    #[serde(rename = "Feminino")]
    Female,
    #[serde(rename = "Não-binário")]
    NonBinary,
    #[serde(rename = "Prefiro não dizer")]
    Undisclosed,
}

impl Gender {
    /// Picks the grammatical form that agrees with the user's gender.
    /// Non-binary and undisclosed users get the combined "o(a)" form.
    pub fn agree<'a>(self, masculine: &'a str, feminine: &'a str, combined: &'a str) -> &'a str {
        match self {
            Gender::Male => masculine,
            Gender::Female => feminine,
            Gender::NonBinary | Gender::Undisclosed => combined,
        }
    }

    /// "amigo", "amiga" or "amigo(a)".
    pub fn friend_noun(self) -> &'static str {
        self.agree("amigo", "amiga", "amigo(a)")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("The profile name must not be empty")]
    EmptyName,
    #[error("The birth date {0} is in the future")]
    BirthDateInFuture(NaiveDate),
}

/// The locally entered profile. Created once at onboarding and only ever
/// replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
}

impl UserProfile {
    /// Validates and builds a profile. `today` bounds the birth date.
    pub fn new(
        name: &str,
        gender: Gender,
        birth_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if birth_date > today {
            return Err(ProfileError::BirthDateInFuture(birth_date));
        }
        Ok(Self {
            name: name.to_string(),
            gender,
            birth_date,
        })
    }

    /// Age in completed years on the given date.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        let mut age = today.year() - self.birth_date.year();
        if (today.month(), today.day()) < (self.birth_date.month(), self.birth_date.day()) {
            age -= 1;
        }
        age.max(0) as u32
    }
}

//=========================================================================================
// Diary, Notes and Tasks
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
}

impl Task {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            completed: false,
        }
    }
}

//=========================================================================================
// Persisted Bundle
//=========================================================================================

/// Everything that survives a restart. Loaded once at startup, written back on
/// a debounce and erased on logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub profile: UserProfile,
    #[serde(default)]
    pub threads: BTreeMap<PersonaMode, Vec<Message>>,
    /// Keyed by ISO date (`YYYY-MM-DD`).
    #[serde(default)]
    pub diary_entries: BTreeMap<String, String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_years_only() {
        let profile = UserProfile::new("Ana", Gender::Female, date(2000, 6, 15), date(2024, 1, 1)).unwrap();
        assert_eq!(profile.age_on(date(2024, 6, 14)), 23);
        assert_eq!(profile.age_on(date(2024, 6, 15)), 24);
    }

    #[test]
    fn profile_rejects_blank_name_and_future_birth_date() {
        let today = date(2024, 1, 1);
        assert_eq!(
            UserProfile::new("   ", Gender::Male, date(2000, 1, 1), today),
            Err(ProfileError::EmptyName)
        );
        assert_eq!(
            UserProfile::new("Rui", Gender::Male, date(2025, 1, 1), today),
            Err(ProfileError::BirthDateInFuture(date(2025, 1, 1)))
        );
    }

    #[test]
    fn gender_uses_form_values_on_the_wire() {
        let json = serde_json::to_string(&Gender::NonBinary).unwrap();
        assert_eq!(json, "\"Não-binário\"");
        let parsed: Gender = serde_json::from_str("\"Feminino\"").unwrap();
        assert_eq!(parsed, Gender::Female);
    }

    #[test]
    fn structured_payload_is_tagged_by_kind() {
        let payload = StructuredPayload::Playlist(Playlist {
            playlist_name: "Estudar".into(),
            description: "Calma".into(),
            songs: vec![Song { title: "Weightless".into(), artist: "Marconi Union".into() }],
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "playlist");
        assert_eq!(value["data"]["playlistName"], "Estudar");
    }

    #[test]
    fn persona_mode_parses_its_own_identifier() {
        for mode in PersonaMode::ALL {
            assert_eq!(mode.as_str().parse::<PersonaMode>(), Ok(mode));
        }
        assert!("sofi".parse::<PersonaMode>().is_err());
    }
}
