use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

/// Direct Sound's FIFOs are drained at whatever rate the active timer
/// overflows; we resample that onto a fixed host rate instead of trying
/// to reproduce the timer-driven cadence exactly (spec Non-goals exclude
/// cycle-perfect audio timing).
pub const SAMPLE_RATE: i32 = 32_768;

pub(crate) struct AudioPlayer {
    buffer: Arc<Mutex<VecDeque<i16>>>,
}

impl AudioCallback for AudioPlayer {
    type Channel = i16;
    fn callback(&mut self, out: &mut [i16]) {
        let mut buf = self.buffer.lock().unwrap();
        for sample in out.iter_mut() {
            *sample = buf.pop_front().unwrap_or(0);
        }
    }
}

/// Shared, interleaved stereo ring buffer the emulator thread pushes
/// samples into; the SDL audio callback thread pops them out.
pub type AudioRing = Arc<Mutex<VecDeque<i16>>>;

pub fn init(sdl_audio: &sdl2::AudioSubsystem) -> (AudioDevice<AudioPlayer>, AudioRing) {
    let ring: AudioRing = Arc::new(Mutex::new(VecDeque::with_capacity(8192)));

    let desired_spec = AudioSpecDesired { freq: Some(SAMPLE_RATE), channels: Some(2), samples: Some(1024) };

    let device = sdl_audio
        .open_playback(None, &desired_spec, |_spec| AudioPlayer { buffer: Arc::clone(&ring) })
        .expect("failed to open SDL audio device");

    device.resume();
    (device, ring)
}
