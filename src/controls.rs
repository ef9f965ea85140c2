use crate::models::{
    actuator_command::{ActuatorCommand, Decision},
    distance_sample::DistanceSample,
};

/// Default presence threshold in centimeters.
pub const DISTANCE_THRESHOLD_CM: f32 = 200f32;

/// Map a distance sample to a presence flag and relay command.
/// Presence requires a valid sample strictly between 0 and `threshold_cm`.
/// Fan and light both follow presence with no hysteresis, so a single
/// invalid or out of range sample switches everything off.
pub fn decide(sample: &DistanceSample, threshold_cm: f32) -> Decision {
    let presence = match sample.centimeters() {
        Some(cm) => cm > 0f32 && cm < threshold_cm,
        None => false,
    };
    Decision {
        presence,
        command: if presence {
            ActuatorCommand::ON
        } else {
            ActuatorCommand::OFF
        },
    }
}
