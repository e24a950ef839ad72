use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed label set every emotion distribution covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Neutral,
    Happy,
    Surprise,
    Sad,
    Angry,
    Disgust,
    Fear,
    Contempt,
}

impl EmotionLabel {
    pub const ALL: &[EmotionLabel] = &[
        EmotionLabel::Neutral,
        EmotionLabel::Happy,
        EmotionLabel::Surprise,
        EmotionLabel::Sad,
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Contempt => "contempt",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative intensity per emotion label for one face in one frame.
///
/// Always covers every label in [`EmotionLabel::ALL`]. Scores are not
/// required to sum to any particular total.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<EmotionLabel, f64>",
    into = "BTreeMap<EmotionLabel, f64>"
)]
pub struct EmotionDistribution(BTreeMap<EmotionLabel, f64>);

impl From<BTreeMap<EmotionLabel, f64>> for EmotionDistribution {
    fn from(map: BTreeMap<EmotionLabel, f64>) -> Self {
        Self::from_scores(map)
    }
}

impl From<EmotionDistribution> for BTreeMap<EmotionLabel, f64> {
    fn from(dist: EmotionDistribution) -> Self {
        dist.0
    }
}

impl EmotionDistribution {
    /// Builds a distribution from partial scores.
    ///
    /// Missing labels score 0. Negative and non-finite scores are clamped to 0.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (EmotionLabel, f64)>,
    {
        let mut map: BTreeMap<EmotionLabel, f64> =
            EmotionLabel::ALL.iter().map(|&label| (label, 0.0)).collect();
        for (label, score) in scores {
            let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
            map.insert(label, score);
        }
        Self(map)
    }

    /// Best-effort result when no face can be read from a crop.
    pub fn neutral() -> Self {
        Self::from_scores([(EmotionLabel::Neutral, 100.0)])
    }

    pub fn get(&self, label: EmotionLabel) -> f64 {
        self.0.get(&label).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        self.0.iter().map(|(label, score)| (*label, *score))
    }

    /// Label with the highest score; ties go to the label listed first.
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Neutral;
        let mut best_score = f64::NEG_INFINITY;
        for (label, score) in self.iter() {
            if score > best_score {
                best = label;
                best_score = score;
            }
        }
        best
    }
}
