//! Question bank for encounters
//!
//! The UI only ever sees a `QuestionView`; the correct index stays here.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub text: String,
    pub options: Vec<String>,
    pub correct: usize,
}

impl Question {
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    questions: Vec<Question>,
    last_id: Option<u32>,
}

impl Default for QuestionBank {
    fn default() -> Self {
        Self::builtin()
    }
}

fn question(id: u32, text: &str, options: &[&str], correct: usize) -> Question {
    Question {
        id,
        text: text.to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct,
    }
}

impl QuestionBank {
    pub fn builtin() -> Self {
        Self {
            questions: vec![
                question(1, "What is 7 × 8?", &["54", "56", "64", "48"], 1),
                question(2, "Which planet is closest to the Sun?", &["Venus", "Earth", "Mercury", "Mars"], 2),
                question(3, "How many sides does a hexagon have?", &["5", "6", "7", "8"], 1),
                question(4, "Water freezes at how many degrees Celsius?", &["0", "10", "32", "100"], 0),
                question(5, "What is half of 150?", &["65", "70", "75", "80"], 2),
                question(6, "Which animal stores fat in its hump?", &["Horse", "Camel", "Goat", "Llama"], 1),
                question(7, "How many minutes are in two hours?", &["100", "110", "120", "140"], 2),
                question(8, "What gas do plants absorb from the air?", &["Oxygen", "Nitrogen", "Helium", "Carbon dioxide"], 3),
            ],
            last_id: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let questions: Vec<Question> =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse {
                what: "question bank",
                source,
            })?;
        if questions.is_empty() {
            return Err(ConfigError::invalid("questions", "bank is empty"));
        }
        for q in &questions {
            if q.options.len() < 2 {
                return Err(ConfigError::invalid(
                    "questions",
                    format!("question {} needs at least two options", q.id),
                ));
            }
            if q.correct >= q.options.len() {
                return Err(ConfigError::invalid(
                    "questions",
                    format!("question {} marks option {} correct", q.id, q.correct),
                ));
            }
        }
        Ok(Self {
            questions,
            last_id: None,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Forget the last draw so a new run starts without history
    pub fn reset(&mut self) {
        self.last_id = None;
    }

    /// Random question, never the same one twice in a row when there is a choice
    pub fn draw(&mut self, rng: &mut impl Rng) -> Option<Question> {
        if self.questions.is_empty() {
            return None;
        }
        let mut idx = rng.random_range(0..self.questions.len());
        if self.questions.len() > 1 && Some(self.questions[idx].id) == self.last_id {
            idx = (idx + 1) % self.questions.len();
        }
        let picked = self.questions[idx].clone();
        self.last_id = Some(picked.id);
        Some(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_builtin_bank_is_consistent() {
        let bank = QuestionBank::builtin();
        assert!(!bank.is_empty());
        for q in &bank.questions {
            assert!(q.correct < q.options.len());
        }
    }

    #[test]
    fn test_draw_never_repeats_back_to_back() {
        let mut bank = QuestionBank::builtin();
        let mut rng = Pcg32::seed_from_u64(3);
        let mut last = None;
        for _ in 0..100 {
            let q = bank.draw(&mut rng).expect("bank not empty");
            assert_ne!(Some(q.id), last);
            last = Some(q.id);
        }
    }

    #[test]
    fn test_reset_forgets_the_last_draw() {
        let mut used = QuestionBank::builtin();
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..5 {
            used.draw(&mut rng);
        }
        used.reset();

        // Same rolls from here on must give the same questions as a new bank
        let mut fresh = QuestionBank::builtin();
        for seed in 0..50 {
            let a = used.draw(&mut Pcg32::seed_from_u64(seed)).map(|q| q.id);
            let b = fresh.draw(&mut Pcg32::seed_from_u64(seed)).map(|q| q.id);
            assert_eq!(a, b, "seed {seed}");
            used.reset();
            fresh.reset();
        }
    }

    #[test]
    fn test_load_reads_a_bank_from_disk() {
        let path = std::env::temp_dir().join(format!("runner-core-bank-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[
                { "id": 1, "text": "3 × 3?", "options": ["6", "9"], "correct": 1 },
                { "id": 2, "text": "10 - 4?", "options": ["6", "7", "8"], "correct": 0 }
            ]"#,
        )
        .expect("temp file is writable");
        let loaded = QuestionBank::load(&path);
        let _ = std::fs::remove_file(&path);

        let mut bank = loaded.expect("bank loads");
        assert_eq!(bank.len(), 2);
        let q = bank.draw(&mut Pcg32::seed_from_u64(1)).expect("not empty");
        assert!(q.id == 1 || q.id == 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = QuestionBank::load("/definitely/not/here.json").expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_json_bank_validation() {
        let ok = QuestionBank::from_json_str(
            r#"[{ "id": 9, "text": "2 + 2?", "options": ["3", "4"], "correct": 1 }]"#,
        )
        .expect("valid bank");
        assert_eq!(ok.len(), 1);

        let bad = QuestionBank::from_json_str(
            r#"[{ "id": 9, "text": "2 + 2?", "options": ["3", "4"], "correct": 2 }]"#,
        );
        assert!(matches!(bad, Err(ConfigError::Invalid { .. })));

        assert!(matches!(
            QuestionBank::from_json_str("[]"),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
