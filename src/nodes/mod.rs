/// Built-in transformation nodes
///
/// Each node here is a [`crate::node::Processor`]; wrap it in a
/// [`crate::node::Effect`] to put it in a chain.
///
/// # Nodes
/// - [`delay::Delay`] - shift every event later by a fixed amount
/// - [`mirror::Mirror`] - reflect pitches around a center pitch
/// - [`pitch_shift::PitchShift`] - transpose notes
/// - [`velocity_shift::VelocityShift`] - push velocities toward 0 or 128
/// - [`dropout::Dropout`] - drop random notes
/// - [`buffer_delay::BufferDelay`] - record a phrase and replay it on a trigger
pub mod buffer_delay;
pub mod delay;
pub mod dropout;
pub mod mirror;
pub mod pitch_shift;
pub mod velocity_shift;

pub use buffer_delay::BufferDelay;
pub use delay::Delay;
pub use dropout::Dropout;
pub use mirror::Mirror;
pub use pitch_shift::PitchShift;
pub use velocity_shift::VelocityShift;

/// Bring a pitch into `0..127` by whole octaves
pub fn clip_pitch(pitch: i32) -> i32 {
    let mut pitch = pitch;
    while pitch >= 127 {
        pitch -= 12;
    }
    while pitch < 0 {
        pitch += 12;
    }
    pitch
}
