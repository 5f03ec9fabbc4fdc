use rand::Rng;

pub const MAX_WIND_SPEED_MPS: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindReading {
    /// In [0, 25]
    pub speed_mps: f64,
    /// In [0, 360)
    pub direction_deg: f64,
}

/// Source of the wind reading attached to forwarded events.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait WindSource: Send + Sync {
    fn sample(&self) -> WindReading;
}

/// Uniform random wind. Not a measurement; it only fills the event shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomWind;

impl WindSource for RandomWind {
    fn sample(&self) -> WindReading {
        let mut rng = rand::thread_rng();
        WindReading {
            speed_mps: rng.gen_range(0.0..=MAX_WIND_SPEED_MPS),
            direction_deg: rng.gen_range(0.0..360.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_wind_stays_in_range() {
        let wind = RandomWind;
        for _ in 0..1_000 {
            let reading = wind.sample();
            assert!((0.0..=MAX_WIND_SPEED_MPS).contains(&reading.speed_mps));
            assert!((0.0..360.0).contains(&reading.direction_deg));
        }
    }
}
