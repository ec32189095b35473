use serde::{Deserialize, Serialize};

use crate::PlayerName;

pub const DEFAULT_SCORE_MULTIPLIER: f64 = 100.0;

/// Definition of a quiz game: a board of categories, each holding questions
/// of increasing value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameData {
    pub categories: Vec<Category>,
    /// Points awarded per question rank. Defaults to 100 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_multiplier: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Question {
    pub question: String,
    /// Reference answers, only ever shown to admins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<String>,
}

impl GameData {
    pub fn score_multiplier(&self) -> f64 {
        self.score_multiplier.unwrap_or(DEFAULT_SCORE_MULTIPLIER)
    }

    pub fn total_questions(&self) -> usize {
        self.categories.iter().map(|c| c.questions.len()).sum()
    }

    pub fn question_at(&self, category: usize, question: usize) -> Option<&Question> {
        self.categories.get(category)?.questions.get(question)
    }

    /// Points for the question at the given rank within its category. The
    /// first question is worth one multiplier, the second two, and so on.
    pub fn question_points(&self, question: usize) -> f64 {
        self.score_multiplier() * (question as f64 + 1.0)
    }

    /// Summary shown to every player; leaves the questions themselves out.
    pub fn info(&self) -> GameInfo {
        GameInfo {
            categories: self.categories.iter().map(|c| c.name.clone()).collect(),
            num_questions: self
                .categories
                .iter()
                .map(|c| c.questions.len())
                .max()
                .unwrap_or(0),
            score_multiplier: self.score_multiplier(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub categories: Vec<String>,
    pub num_questions: usize,
    pub score_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_name: PlayerName,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AnsweredQuestion {
    pub category: usize,
    pub question: usize,
    pub player: PlayerName,
}
