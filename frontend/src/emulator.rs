use gba_core::machine::Machine;
use sdl2::event::Event;
use sdl2::keyboard::Scancode;

use crate::audio::{self, AudioRing};
use crate::input::KeyMap;
use crate::video::Video;

pub fn run(machine: &mut dyn Machine, key_map: &KeyMap, scale: u32) {
    let sdl_context = sdl2::init().expect("failed to initialize SDL2");
    let sdl_video = sdl_context.video().expect("failed to init SDL video");
    let sdl_audio = sdl_context.audio().expect("failed to init SDL audio");

    let (width, height) = machine.display_size();
    let mut video = Video::new(&sdl_video, "GBA-ish", width as u32, height as u32, scale);
    let mut event_pump = sdl_context.event_pump().expect("failed to get event pump");

    let (_audio_device, ring): (_, AudioRing) = audio::init(&sdl_audio);
    let samples_per_frame = audio::SAMPLE_RATE as usize / 60;
    let mut audio_chunk = vec![0i16; samples_per_frame * 2];

    'main: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'main,
                Event::KeyDown { scancode: Some(Scancode::Escape), .. } => break 'main,
                Event::KeyDown { scancode: Some(sc), repeat: false, .. } => {
                    if let Some(button) = key_map.get(sc) {
                        machine.set_input(button, true);
                    }
                }
                Event::KeyUp { scancode: Some(sc), .. } => {
                    if let Some(button) = key_map.get(sc) {
                        machine.set_input(button, false);
                    }
                }
                _ => {}
            }
        }

        machine.run_frame();
        video.present(machine.render_frame());

        machine.fill_audio(&mut audio_chunk);
        let mut buf = ring.lock().unwrap();
        buf.extend(audio_chunk.iter().copied());
        // Cap backlog so a paused/slow host doesn't build unbounded latency.
        while buf.len() > samples_per_frame * 2 * 4 {
            buf.pop_front();
        }
    }
}
