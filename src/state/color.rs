//! Target colors and the accuracy arithmetic used to score a guess.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dao::models::ColorEntity;

/// Largest possible Euclidean distance between two RGB colors, `√(3·255²)`.
pub fn max_distance() -> f64 {
    (3.0 * 255.0_f64 * 255.0).sqrt()
}

/// A color in 8-bit RGB space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Draw a target color, each channel independently uniform over 0..=255.
    pub fn random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            r: rng.random(),
            g: rng.random(),
            b: rng.random(),
        }
    }

    /// Euclidean distance between the two colors over raw channel values.
    pub fn distance(&self, other: &Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Scored result of comparing a guess against the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GuessScore {
    pub distance: f64,
    /// Percentage in `[0, 100]`, rounded to two decimals.
    pub accuracy: f64,
    pub points: u32,
}

/// Accuracy percentage for a raw distance, rounded to two decimals.
pub fn accuracy_for_distance(distance: f64) -> f64 {
    let accuracy = (100.0 - distance / max_distance() * 100.0).max(0.0);
    (accuracy * 100.0).round() / 100.0
}

/// Points awarded for an accuracy percentage.
pub fn points_for_accuracy(accuracy: f64) -> u32 {
    accuracy.round().clamp(0.0, 100.0) as u32
}

/// Score a guess against a target.
pub fn score_guess(target: &Rgb, guess: &Rgb) -> GuessScore {
    let distance = target.distance(guess);
    let accuracy = accuracy_for_distance(distance);
    GuessScore {
        distance,
        accuracy,
        points: points_for_accuracy(accuracy),
    }
}

impl From<ColorEntity> for Rgb {
    fn from(value: ColorEntity) -> Self {
        Self {
            r: value.r,
            g: value.g,
            b: value.b,
        }
    }
}

impl From<Rgb> for ColorEntity {
    fn from(value: Rgb) -> Self {
        Self {
            r: value.r,
            g: value.g,
            b: value.b,
        }
    }
}
