//! The "guess the past photo" challenge: one correct historical photo
//! hidden among three distractors.
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::mission::HistoricalPhoto;

/// Number of options shown per round.
pub const QUIZ_OPTIONS: usize = 4;

/// Errors raised while assembling a quiz round.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("need at least {QUIZ_OPTIONS} photos to build a round (have {have})")]
    NotEnoughPhotos { have: usize },
    #[error("no photo matches location {0:?}")]
    AnswerNotFound(String),
}

/// A shuffled quiz round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoQuiz {
    pub options: Vec<HistoricalPhoto>,
    pub answer_id: u64,
}

impl PhotoQuiz {
    #[must_use]
    pub fn is_correct(&self, photo_id: u64) -> bool {
        self.answer_id == photo_id
    }

    #[must_use]
    pub fn answer(&self) -> Option<&HistoricalPhoto> {
        self.options.iter().find(|p| p.id == self.answer_id)
    }
}

/// Loose name matching: exact, or either name contains the other.
fn names_match(photo_title: &str, location_name: &str) -> bool {
    let title = photo_title.trim();
    let name = location_name.trim();
    !title.is_empty() && !name.is_empty() && (title.contains(name) || name.contains(title))
}

/// Build a round for a mission location from the full photo pool.
///
/// Picks the photo whose title matches the location name as the answer,
/// draws three random distractors from the rest, then shuffles the four.
///
/// # Errors
///
/// Returns an error when the pool is too small or no photo matches the
/// location name.
pub fn build_photo_quiz<R: Rng + ?Sized>(
    pool: &[HistoricalPhoto],
    location_name: &str,
    rng: &mut R,
) -> Result<PhotoQuiz, QuizError> {
    if pool.len() < QUIZ_OPTIONS {
        return Err(QuizError::NotEnoughPhotos { have: pool.len() });
    }
    let answer = pool
        .iter()
        .find(|p| names_match(&p.title, location_name))
        .ok_or_else(|| QuizError::AnswerNotFound(location_name.to_string()))?;

    let mut distractors: Vec<&HistoricalPhoto> =
        pool.iter().filter(|p| p.id != answer.id).collect();
    distractors.shuffle(rng);

    let mut options: Vec<HistoricalPhoto> = distractors
        .into_iter()
        .take(QUIZ_OPTIONS - 1)
        .cloned()
        .collect();
    options.push(answer.clone());
    options.shuffle(rng);

    Ok(PhotoQuiz {
        options,
        answer_id: answer.id,
    })
}
