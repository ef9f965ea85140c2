use core::{fmt::Display, marker::PhantomData, time::Duration};
use thiserror_no_std::Error;

/// Speed of sound in dry air at roughly 20 degC, in centimeters per second.
pub const SPEED_OF_SOUND_CM_PER_S: f32 = 34_300f32;

/// Centimeters travelled per second of echo pulse width. The echo pulse covers
/// the trip out and back, so only half of it is the distance to the target.
pub const ECHO_CM_PER_S: f32 = SPEED_OF_SOUND_CM_PER_S / 2f32;

/// Store physical unit value of a distance in centimeters.
///
/// ```
/// use common::physical::Distance;
/// let distance = Distance::new(150f32).expect("Failed to get Distance representation.");
/// assert_eq!(distance.centimeters(), 150f32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Distance {
    centimeters: f32,

    /// Make sure this can't be constructed with struct literals.
    _private: PhantomData<()>,
}

/// Represents errors in creating or using the `Distance` type.
#[derive(Debug, Error)]
pub enum DistanceError {
    /// The distance was negative, NaN or infinite.
    #[error("Value outside of valid state space representation!")]
    OutOfValidStateSpace,
}

impl Distance {
    /// Construct a Distance from centimeters.
    /// Will return `OutOfValidStateSpace` if the value is negative or not finite.
    pub fn new(centimeters: f32) -> Result<Self, DistanceError> {
        if !centimeters.is_finite() || centimeters.is_sign_negative() {
            return Err(DistanceError::OutOfValidStateSpace);
        }
        Ok(Self {
            centimeters,
            _private: PhantomData,
        })
    }

    /// Convert the width of an ultrasonic echo pulse (a round trip) into the
    /// one way distance to the reflecting object.
    pub fn from_echo(round_trip: Duration) -> Self {
        Self {
            centimeters: round_trip.as_secs_f32() * ECHO_CM_PER_S,
            _private: PhantomData,
        }
    }

    pub fn centimeters(&self) -> f32 {
        self.centimeters
    }
}

impl Display for Distance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "<Distance: {:.2} cm>", self.centimeters)
    }
}

impl From<Distance> for f32 {
    fn from(value: Distance) -> Self {
        value.centimeters
    }
}
