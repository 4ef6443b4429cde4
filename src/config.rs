//! Application-level configuration loading, including quiz defaults and demo roster fixtures.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use uuid::{Uuid, uuid};

use crate::dao::models::{Gender, PersonEntity};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MUGMATCH_BACK_CONFIG_PATH";

/// Roster identifier of the built-in demo roster seeded when no config file exists.
pub const DEMO_ROSTER_ID: Uuid = uuid!("6f1c7a52-0d6e-4a8f-9c3b-2f4f4de0a901");

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    quiz: QuizDefaults,
    rosters: Vec<RosterFixture>,
}

#[derive(Debug, Clone)]
/// Fallback quiz settings applied when a session is created without overrides.
pub struct QuizDefaults {
    /// Number of questions asked per quiz.
    pub total_questions: u32,
    /// Seconds granted to answer each question.
    pub time_limit_seconds: u32,
    /// Number of options shown per question, correct answer included.
    pub options_count: u32,
}

#[derive(Debug, Clone)]
/// A named roster of people available for session creation.
pub struct RosterFixture {
    /// Stable identifier referenced by session create requests.
    pub id: Uuid,
    /// Display name of the roster.
    pub name: String,
    /// People belonging to the roster.
    pub people: Vec<PersonEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rosters = app_config.rosters.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Quiz settings applied when a create request leaves a field unset.
    pub fn quiz(&self) -> &QuizDefaults {
        &self.quiz
    }

    /// Configured rosters, built-in demo roster included when none were supplied.
    pub fn rosters(&self) -> &[RosterFixture] {
        &self.rosters
    }

    /// All fixture people across every roster, used to seed a fresh storage backend.
    pub fn fixture_people(&self) -> Vec<PersonEntity> {
        self.rosters
            .iter()
            .flat_map(|roster| roster.people.iter().cloned())
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quiz: QuizDefaults::default(),
            rosters: vec![demo_roster()],
        }
    }
}

impl Default for QuizDefaults {
    fn default() -> Self {
        Self {
            total_questions: 5,
            time_limit_seconds: 20,
            options_count: 4,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    quiz: RawQuizDefaults,
    #[serde(default)]
    rosters: Vec<RawRoster>,
}

#[derive(Debug, Default, Deserialize)]
struct RawQuizDefaults {
    total_questions: Option<u32>,
    time_limit_seconds: Option<u32>,
    options_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRoster {
    id: Uuid,
    name: String,
    people: Vec<RawPerson>,
}

#[derive(Debug, Deserialize)]
struct RawPerson {
    id: Uuid,
    first_name: String,
    last_name: String,
    gender: Gender,
    photo_url: String,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = QuizDefaults::default();
        let quiz = QuizDefaults {
            total_questions: value.quiz.total_questions.unwrap_or(defaults.total_questions),
            time_limit_seconds: value
                .quiz
                .time_limit_seconds
                .unwrap_or(defaults.time_limit_seconds),
            options_count: value.quiz.options_count.unwrap_or(defaults.options_count),
        };

        let mut rosters: Vec<RosterFixture> =
            value.rosters.into_iter().map(Into::into).collect();
        if rosters.is_empty() {
            rosters.push(demo_roster());
        }

        Self { quiz, rosters }
    }
}

impl From<RawRoster> for RosterFixture {
    fn from(value: RawRoster) -> Self {
        let roster_id = value.id;
        Self {
            id: roster_id,
            name: value.name,
            people: value
                .people
                .into_iter()
                .map(|person| PersonEntity {
                    id: person.id,
                    roster_id,
                    first_name: person.first_name,
                    last_name: person.last_name,
                    gender: person.gender,
                    photo_url: person.photo_url,
                })
                .collect(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in demo roster shipped with the binary.
fn demo_roster() -> RosterFixture {
    let person = |id: Uuid, first: &str, last: &str, gender: Gender, slug: &str| PersonEntity {
        id,
        roster_id: DEMO_ROSTER_ID,
        first_name: first.to_owned(),
        last_name: last.to_owned(),
        gender,
        photo_url: format!("/assets/demo/{slug}.jpg"),
    };

    RosterFixture {
        id: DEMO_ROSTER_ID,
        name: "Computing pioneers".to_owned(),
        people: vec![
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d01"),
                "Ada",
                "Lovelace",
                Gender::Female,
                "ada-lovelace",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d02"),
                "Alan",
                "Turing",
                Gender::Male,
                "alan-turing",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d03"),
                "Grace",
                "Hopper",
                Gender::Female,
                "grace-hopper",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d04"),
                "Edsger",
                "Dijkstra",
                Gender::Male,
                "edsger-dijkstra",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d05"),
                "Margaret",
                "Hamilton",
                Gender::Female,
                "margaret-hamilton",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d06"),
                "Donald",
                "Knuth",
                Gender::Male,
                "donald-knuth",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d07"),
                "Barbara",
                "Liskov",
                Gender::Female,
                "barbara-liskov",
            ),
            person(
                uuid!("71f6f4b2-8a46-4f0e-b5e3-5f7e9a7c0d08"),
                "Dennis",
                "Ritchie",
                Gender::Male,
                "dennis-ritchie",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_config_fills_missing_quiz_fields_from_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"quiz": {"total_questions": 8}, "rosters": []}"#)
                .expect("parse raw config");
        let config: AppConfig = raw.into();

        assert_eq!(config.quiz().total_questions, 8);
        assert_eq!(
            config.quiz().time_limit_seconds,
            QuizDefaults::default().time_limit_seconds
        );
        assert_eq!(
            config.quiz().options_count,
            QuizDefaults::default().options_count
        );
    }

    #[test]
    fn empty_roster_list_falls_back_to_demo_roster() {
        let raw: RawConfig = serde_json::from_str("{}").expect("parse raw config");
        let config: AppConfig = raw.into();

        assert_eq!(config.rosters().len(), 1);
        assert_eq!(config.rosters()[0].id, DEMO_ROSTER_ID);
        assert!(config.rosters()[0].people.len() >= 2);
    }

    #[test]
    fn roster_people_inherit_the_roster_id() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "rosters": [{
                    "id": "a6f1c7a5-0d6e-4a8f-9c3b-2f4f4de0a111",
                    "name": "Office",
                    "people": [{
                        "id": "b6f1c7a5-0d6e-4a8f-9c3b-2f4f4de0a222",
                        "first_name": "Jo",
                        "last_name": "Miller",
                        "gender": "female",
                        "photo_url": "/assets/jo.jpg"
                    }]
                }]
            }"#,
        )
        .expect("parse raw config");
        let config: AppConfig = raw.into();

        let roster = &config.rosters()[0];
        assert_eq!(roster.people[0].roster_id, roster.id);
    }
}
