use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};

pub struct Video {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl Video {
    /// Create an SDL window and renderer for the given native resolution.
    pub fn new(sdl_video: &sdl2::VideoSubsystem, title: &str, native_width: u32, native_height: u32, scale: u32) -> Self {
        let window = sdl_video
            .window(title, native_width * scale, native_height * scale)
            .position_centered()
            .build()
            .expect("failed to create window");

        let canvas = window.into_canvas().accelerated().present_vsync().build().expect("failed to create canvas");

        let texture_creator = canvas.texture_creator();

        Self {
            canvas,
            texture_creator,
            width: native_width,
            height: native_height,
            bytes: vec![0u8; (native_width * native_height * 4) as usize],
        }
    }

    /// Upload a frame of packed `0xAABBGGRR` pixels and present it. The
    /// per-pixel byte order `RGBA32` names is what [`core::video`] already
    /// produces, so this is a straight reinterpret, not a conversion.
    pub fn present(&mut self, framebuffer: &[u32]) {
        for (chunk, pixel) in self.bytes.chunks_exact_mut(4).zip(framebuffer) {
            chunk.copy_from_slice(&pixel.to_le_bytes());
        }

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGBA32, self.width, self.height)
            .expect("failed to create texture");

        texture.update(None, &self.bytes, (self.width * 4) as usize).expect("failed to update texture");

        self.canvas.clear();
        self.canvas.copy(&texture, None, None).expect("failed to copy texture");
        self.canvas.present();
    }
}
