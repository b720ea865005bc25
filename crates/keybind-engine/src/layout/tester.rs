//! Online scoring of layout candidates from observed key presses.

use super::data::{KeyVariant, KeyboardLayoutData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One observed key press: the physical key and the character it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidationInput {
    pub code: String,
    pub character: String,
    pub shift_key: bool,
    pub alt_key: bool,
}

impl KeyValidationInput {
    pub fn new(code: impl Into<String>, character: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            character: character.into(),
            shift_key: false,
            alt_key: false,
        }
    }

    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift_key = shift;
        self
    }

    pub fn with_alt(mut self, alt: bool) -> Self {
        self.alt_key = alt;
        self
    }
}

/// Persistable tester state. Scores are keyed by layout id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyboardTesterState {
    pub scores: BTreeMap<String, u32>,
    pub top_score: u32,
    pub tested_inputs: BTreeMap<String, String>,
}

/// Scores every candidate layout against observed input.
///
/// A candidate gains a point for each distinct observation it explains.
/// Seeing the same key and modifier combination produce a different character
/// than before starts a new session with all scores at zero.
#[derive(Debug, Clone)]
pub struct KeyboardTester {
    candidates: Vec<KeyboardLayoutData>,
    scores: Vec<u32>,
    top_score: u32,
    tested_inputs: BTreeMap<String, String>,
}

impl KeyboardTester {
    pub fn new(candidates: Vec<KeyboardLayoutData>) -> Self {
        let scores = vec![0; candidates.len()];
        Self {
            candidates,
            scores,
            top_score: 0,
            tested_inputs: BTreeMap::new(),
        }
    }

    pub fn candidates(&self) -> &[KeyboardLayoutData] {
        &self.candidates
    }

    /// Scores, parallel to [`Self::candidates`].
    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    pub fn top_score(&self) -> u32 {
        self.top_score
    }

    /// Number of distinct observations in this session.
    pub fn input_count(&self) -> usize {
        self.tested_inputs.len()
    }

    pub fn reset(&mut self) {
        self.scores.iter_mut().for_each(|s| *s = 0);
        self.top_score = 0;
        self.tested_inputs.clear();
    }

    /// Score one observation. Returns false when it was already seen with
    /// the same character.
    pub fn update_scores(&mut self, input: &KeyValidationInput) -> bool {
        let variant = KeyVariant::from_modifiers(input.shift_key, input.alt_key);
        let input_key = format!("{}.{}", input.code, variant);

        match self.tested_inputs.get(&input_key) {
            Some(seen) if *seen == input.character => return false,
            // Same keystroke, different character: the layout changed.
            Some(_) => self.reset(),
            None => {}
        }

        for (candidate, score) in self.candidates.iter().zip(self.scores.iter_mut()) {
            if candidate.character(&input.code, variant) == Some(input.character.as_str()) {
                *score += 1;
            }
            self.top_score = self.top_score.max(*score);
        }
        self.tested_inputs.insert(input_key, input.character.clone());
        true
    }

    pub fn get_state(&self) -> KeyboardTesterState {
        KeyboardTesterState {
            scores: self
                .candidates
                .iter()
                .zip(&self.scores)
                .map(|(c, s)| (c.id(), *s))
                .collect(),
            top_score: self.top_score,
            tested_inputs: self.tested_inputs.clone(),
        }
    }

    /// Restore a saved session. Scores of unknown layouts are ignored.
    pub fn set_state(&mut self, state: &KeyboardTesterState) {
        self.reset();
        for (candidate, score) in self.candidates.iter().zip(self.scores.iter_mut()) {
            if let Some(saved) = state.scores.get(&candidate.id()) {
                *score = *saved;
            }
        }
        self.top_score = state.top_score;
        self.tested_inputs = state.tested_inputs.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::builtin::BuiltinLayout;

    fn tester() -> KeyboardTester {
        KeyboardTester::new(vec![
            BuiltinLayout::EnUsPc.data(),
            BuiltinLayout::DeGermanPc.data(),
        ])
    }

    #[test]
    fn test_matching_candidates_score() {
        let mut tester = tester();
        assert!(tester.update_scores(&KeyValidationInput::new("KeyZ", "y")));
        assert_eq!(tester.scores(), &[0, 1]);
        assert_eq!(tester.top_score(), 1);

        assert!(tester.update_scores(&KeyValidationInput::new("KeyA", "a")));
        assert_eq!(tester.scores(), &[1, 2]);
        assert_eq!(tester.input_count(), 2);
    }

    #[test]
    fn test_repeated_input_is_ignored() {
        let mut tester = tester();
        assert!(tester.update_scores(&KeyValidationInput::new("KeyA", "a")));
        assert!(!tester.update_scores(&KeyValidationInput::new("KeyA", "a")));
        assert_eq!(tester.scores(), &[1, 1]);
    }

    #[test]
    fn test_contradiction_resets_session() {
        let mut tester = tester();
        tester.update_scores(&KeyValidationInput::new("KeyA", "a"));
        tester.update_scores(&KeyValidationInput::new("KeyZ", "z"));
        assert_eq!(tester.scores(), &[2, 1]);

        assert!(tester.update_scores(&KeyValidationInput::new("KeyZ", "y")));
        assert_eq!(tester.scores(), &[0, 1]);
        assert_eq!(tester.top_score(), 1);
        assert_eq!(tester.input_count(), 1);
    }

    #[test]
    fn test_variants_are_distinct_inputs() {
        let mut tester = tester();
        tester.update_scores(&KeyValidationInput::new("Digit7", "7"));
        assert!(tester.update_scores(&KeyValidationInput::new("Digit7", "/").with_shift(true)));
        assert!(tester.update_scores(&KeyValidationInput::new("Digit7", "{").with_alt(true)));
        assert_eq!(tester.scores(), &[1, 3]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut tester = tester();
        tester.update_scores(&KeyValidationInput::new("KeyZ", "y"));
        let state = tester.get_state();
        assert_eq!(state.scores.get("de-German-pc"), Some(&1));

        let mut restored = self::tester();
        restored.set_state(&state);
        assert_eq!(restored.scores(), tester.scores());
        assert!(!restored.update_scores(&KeyValidationInput::new("KeyZ", "y")));
    }
}
