//! Question generation.
//!
//! A quiz is a random walk through the roster: shuffled people become the
//! correct answers, each padded with distractors drawn from the rest of the
//! roster. Distractors prefer people of the same gender as the correct
//! answer so options stay plausible; when the roster cannot supply enough,
//! the pool widens to everyone.

use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::dao::models::{PersonEntity, QuestionKind};
use crate::dto::play::{QuestionOption, QuestionPrompt, QuestionView};

/// Smallest roster a quiz can be generated from.
pub const MIN_ROSTER_SIZE: usize = 2;

/// Parameters for one generated quiz.
#[derive(Debug, Clone, Copy)]
pub struct QuizSettings {
    pub total_questions: usize,
    /// Options per question, the correct answer included.
    pub options_count: usize,
}

/// One generated question.
#[derive(Debug, Clone)]
pub struct Question {
    pub correct: PersonEntity,
    /// Shuffled options, the correct person among them.
    pub options: Vec<PersonEntity>,
}

/// Reasons a quiz cannot be generated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("roster holds {0} people but at least {MIN_ROSTER_SIZE} are required")]
    InsufficientRoster(usize),
}

/// Generate a quiz from `roster`.
///
/// Yields at most `roster.len()` questions, each person asked about once.
/// Callers pass the RNG so replays and tests can pin the sequence.
pub fn generate_quiz(
    roster: &[PersonEntity],
    settings: QuizSettings,
    rng: &mut impl Rng,
) -> Result<Vec<Question>, QuizError> {
    if roster.len() < MIN_ROSTER_SIZE {
        return Err(QuizError::InsufficientRoster(roster.len()));
    }

    // Shuffle by sorting on fresh random keys, one draw per person.
    let mut ordered: Vec<&PersonEntity> = roster.iter().collect();
    ordered.sort_by_cached_key(|_| rng.random::<u64>());

    let question_count = settings.total_questions.min(ordered.len());
    let mut questions = Vec::with_capacity(question_count);

    for correct in ordered.into_iter().take(question_count) {
        let needed = settings.options_count.saturating_sub(1).max(1);

        let same_gender: Vec<&PersonEntity> = roster
            .iter()
            .filter(|person| person.id != correct.id && person.gender == correct.gender)
            .collect();
        let pool: Vec<&PersonEntity> = if same_gender.len() >= needed {
            same_gender
        } else {
            roster.iter().filter(|person| person.id != correct.id).collect()
        };

        let mut options: Vec<PersonEntity> = pool
            .choose_multiple(rng, needed)
            .map(|person| (*person).clone())
            .collect();
        options.push(correct.clone());
        options.sort_by_cached_key(|_| rng.random::<u64>());

        questions.push(Question {
            correct: correct.clone(),
            options,
        });
    }

    Ok(questions)
}

/// Project a question into its wire shape for the given direction.
///
/// The hidden side of the pairing never appears: photo options carry no
/// names, name options carry no photos.
pub fn project_question(kind: QuestionKind, question: &Question) -> QuestionView {
    let prompt = match kind {
        QuestionKind::NameToPhoto => QuestionPrompt::Name {
            text: question.correct.display_name(),
        },
        QuestionKind::PhotoToName => QuestionPrompt::Photo {
            photo_url: question.correct.photo_url.clone(),
        },
    };

    let options = question
        .options
        .iter()
        .map(|person| match kind {
            QuestionKind::NameToPhoto => QuestionOption {
                person_id: person.id,
                photo_url: Some(person.photo_url.clone()),
                display_name: None,
            },
            QuestionKind::PhotoToName => QuestionOption {
                person_id: person.id,
                photo_url: None,
                display_name: Some(person.display_name()),
            },
        })
        .collect();

    QuestionView { prompt, options }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::Gender;

    fn person(first: &str, last: &str, gender: Gender) -> PersonEntity {
        PersonEntity {
            id: Uuid::new_v4(),
            roster_id: Uuid::nil(),
            first_name: first.to_owned(),
            last_name: last.to_owned(),
            gender,
            photo_url: format!("/assets/{}.jpg", first.to_lowercase()),
        }
    }

    fn mixed_roster() -> Vec<PersonEntity> {
        vec![
            person("Ada", "Lovelace", Gender::Female),
            person("Grace", "Hopper", Gender::Female),
            person("Katherine", "Johnson", Gender::Female),
            person("Alan", "Turing", Gender::Male),
            person("Dennis", "Ritchie", Gender::Male),
        ]
    }

    #[test]
    fn same_seed_generates_the_same_quiz() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 5,
            options_count: 3,
        };

        let mut first_rng = StdRng::seed_from_u64(7);
        let mut second_rng = StdRng::seed_from_u64(7);
        let first = generate_quiz(&roster, settings, &mut first_rng).unwrap();
        let second = generate_quiz(&roster, settings, &mut second_rng).unwrap();

        let first_ids: Vec<Uuid> = first.iter().map(|q| q.correct.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|q| q.correct.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn tiny_rosters_are_rejected() {
        let roster = vec![person("Ada", "Lovelace", Gender::Female)];
        let settings = QuizSettings {
            total_questions: 5,
            options_count: 3,
        };

        let result = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(0));
        assert_eq!(result.unwrap_err(), QuizError::InsufficientRoster(1));
    }

    #[test]
    fn question_count_is_clamped_to_the_roster() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 50,
            options_count: 3,
        };

        let quiz = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(quiz.len(), roster.len());
        let mut corrects: Vec<Uuid> = quiz.iter().map(|q| q.correct.id).collect();
        corrects.sort();
        corrects.dedup();
        assert_eq!(corrects.len(), roster.len(), "each person asked about once");
    }

    #[test]
    fn options_contain_the_correct_person_exactly_once() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 5,
            options_count: 3,
        };

        let quiz = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(2)).unwrap();

        for question in &quiz {
            assert_eq!(question.options.len(), settings.options_count);
            let hits = question
                .options
                .iter()
                .filter(|person| person.id == question.correct.id)
                .count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn distractors_prefer_the_correct_answers_gender() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 5,
            options_count: 3,
        };

        let quiz = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(3)).unwrap();

        for question in &quiz {
            // Three women in the roster, so a female correct answer always
            // finds two female distractors. Two men cannot, so those
            // questions fall back to the mixed pool.
            if question.correct.gender == Gender::Female {
                assert!(
                    question
                        .options
                        .iter()
                        .all(|person| person.gender == Gender::Female)
                );
            }
        }
    }

    #[test]
    fn name_prompt_questions_show_photos_only() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 1,
            options_count: 3,
        };
        let quiz = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(4)).unwrap();

        let view = project_question(QuestionKind::NameToPhoto, &quiz[0]);

        assert!(matches!(view.prompt, QuestionPrompt::Name { .. }));
        for option in &view.options {
            assert!(option.photo_url.is_some());
            assert!(option.display_name.is_none());
        }
    }

    #[test]
    fn photo_prompt_questions_show_names_only() {
        let roster = mixed_roster();
        let settings = QuizSettings {
            total_questions: 1,
            options_count: 3,
        };
        let quiz = generate_quiz(&roster, settings, &mut StdRng::seed_from_u64(5)).unwrap();

        let view = project_question(QuestionKind::PhotoToName, &quiz[0]);

        match &view.prompt {
            QuestionPrompt::Photo { photo_url } => {
                assert_eq!(photo_url, &quiz[0].correct.photo_url);
            }
            other => panic!("expected photo prompt, got {other:?}"),
        }
        for option in &view.options {
            assert!(option.photo_url.is_none());
            assert!(option.display_name.is_some());
        }
    }
}
