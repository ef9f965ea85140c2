//! Software stand-ins for the physical room: an ultrasonic bench that answers
//! trigger pulses with scripted echoes, and a parallel video bus replaying a
//! scripted signal timeline. Both run the real sensing code against them.

pub mod camera;
pub mod ranging;
