//! Colour-band pixel-ratio scorer.
//!
//! Pixels are converted to 8-bit HSV with hue in degrees, saturation and
//! value in 0..=255. Smoke is grey/white (low saturation, high value, any
//! hue); fire is red/orange (low hue, high saturation, high value). Both bands
//! are counted in the same pass and each confidence is matches / pixels.

use crate::domain::{ClassificationResult, ClassifierError, ClassifierStrategy, FrameClassifier};
use async_trait::async_trait;
use image::{Rgb, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    /// Degrees in [0, 360)
    pub hue: f32,
    pub saturation: u8,
    pub value: u8,
}

impl From<&Rgb<u8>> for Hsv {
    fn from(pixel: &Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0.map(f32::from);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let saturation = if max > 0.0 {
            (delta * 255.0 / max).round()
        } else {
            0.0
        };

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (g - b) / delta
        } else if max == g {
            120.0 + 60.0 * (b - r) / delta
        } else {
            240.0 + 60.0 * (r - g) / delta
        };

        Self {
            hue: if hue < 0.0 { hue + 360.0 } else { hue },
            saturation: saturation as u8,
            value: max as u8,
        }
    }
}

/// Inclusive HSV box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvBand {
    pub hue_min: f32,
    pub hue_max: f32,
    pub saturation_min: u8,
    pub saturation_max: u8,
    pub value_min: u8,
    pub value_max: u8,
}

impl HsvBand {
    pub const SMOKE: HsvBand = HsvBand {
        hue_min: 0.0,
        hue_max: 360.0,
        saturation_min: 0,
        saturation_max: 50,
        value_min: 150,
        value_max: 255,
    };

    pub const FIRE: HsvBand = HsvBand {
        hue_min: 0.0,
        hue_max: 20.0,
        saturation_min: 170,
        saturation_max: 255,
        value_min: 150,
        value_max: 255,
    };

    pub fn contains(&self, hsv: &Hsv) -> bool {
        (self.hue_min..=self.hue_max).contains(&hsv.hue)
            && (self.saturation_min..=self.saturation_max).contains(&hsv.saturation)
            && (self.value_min..=self.value_max).contains(&hsv.value)
    }
}

#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    smoke_band: HsvBand,
    fire_band: HsvBand,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(HsvBand::SMOKE, HsvBand::FIRE)
    }
}

impl HeuristicClassifier {
    pub fn new(smoke_band: HsvBand, fire_band: HsvBand) -> Self {
        Self {
            smoke_band,
            fire_band,
        }
    }

    pub fn score(&self, frame: &RgbImage) -> ClassificationResult {
        let total = u64::from(frame.width()) * u64::from(frame.height());
        if total == 0 {
            return ClassificationResult::default();
        }

        let (smoke, fire) = frame
            .pixels()
            .map(Hsv::from)
            .fold((0u64, 0u64), |(smoke, fire), hsv| {
                (
                    smoke + u64::from(self.smoke_band.contains(&hsv)),
                    fire + u64::from(self.fire_band.contains(&hsv)),
                )
            });

        ClassificationResult {
            smoke_confidence: smoke as f64 / total as f64,
            fire_confidence: fire as f64 / total as f64,
        }
    }
}

#[async_trait]
impl FrameClassifier for HeuristicClassifier {
    fn strategy(&self) -> ClassifierStrategy {
        ClassifierStrategy::Heuristic
    }

    /// The pixel pass never yields, so it runs on the blocking pool.
    async fn classify(&self, frame: &RgbImage) -> Result<ClassificationResult, ClassifierError> {
        let classifier = self.clone();
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || classifier.score(&frame))
            .await
            .map_err(|e| ClassifierError::Unavailable(format!("scoring task failed: {e}")))
    }
}
