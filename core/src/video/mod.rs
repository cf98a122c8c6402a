//! The tiled/bitmap video pipeline: per-scanline compositor for the 4
//! tiled and 3 bitmap modes, sprites, two regular windows, and the affine
//! BG2/BG3 reference-point accumulators (spec §3 "Video pipeline", §4.6).
//!
//! Rendering happens once per scanline, at the draw-side of the HBlank
//! transition, mirroring the reference renderer's "draw into a scanline
//! buffer the moment HDraw ends" scheduling rather than a true per-dot
//! pixel pipeline.

use crate::bus::MemoryRegions;
use crate::io::{self, IoRegs};

pub const SCREEN_WIDTH: usize = 240;
pub const SCREEN_HEIGHT: usize = 160;
pub const NUM_SCANLINES: u32 = 228;

const CYCLES_SCANLINE: u32 = 1232;
const CYCLES_HDRAW: u32 = 1006;
const CYCLES_FRAME: u32 = CYCLES_SCANLINE * NUM_SCANLINES;

const DCNT_PAGE: u16 = 1 << 4;
const DCNT_OBJ_1D: u16 = 1 << 6;
const DCNT_BLANK: u16 = 1 << 7;
const DCNT_BG: [u16; 4] = [1 << 8, 1 << 9, 1 << 10, 1 << 11];
const DCNT_OBJ: u16 = 1 << 12;
const DCNT_WIN0: u16 = 1 << 13;
const DCNT_WIN1: u16 = 1 << 14;
const DCNT_WINOBJ: u16 = 1 << 15;

const DSTAT_HBL_IRQ: u16 = 1 << 4;
const DSTAT_VBL_IRQ: u16 = 1 << 3;
const DSTAT_VCT_IRQ: u16 = 1 << 5;

const SPRITE_WIDTH: [[i32; 4]; 4] = [[8, 16, 32, 64], [16, 32, 32, 64], [8, 8, 16, 32], [8, 8, 8, 8]];
const SPRITE_HEIGHT: [[i32; 4]; 4] = [[8, 16, 32, 64], [8, 8, 16, 32], [16, 32, 32, 64], [8, 8, 8, 8]];

const BG_WIDTH: [[i32; 4]; 2] = [[256, 512, 256, 512], [128, 256, 512, 1024]];
const BG_HEIGHT: [[i32; 4]; 2] = [[256, 256, 512, 512], [128, 256, 512, 1024]];

/// Cross-cutting actions a scanline/frame boundary needs the caller to
/// perform (DMA dispatch reaches into memory and backup, which this module
/// does not own — same split as [`crate::io::IoEvent`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoEvent {
    HBlankDma,
    VBlankDma,
}

#[derive(Clone, Copy, Default)]
struct Window {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

fn in_window(x: i32, y: i32, win: Window) -> bool {
    let x_ok = if win.left < win.right {
        x >= win.left && x < win.right
    } else if win.left > win.right {
        x >= win.left || x < win.right
    } else {
        false
    };
    let y_ok = if win.top < win.bottom {
        y >= win.top && y < win.bottom
    } else if win.top > win.bottom {
        y >= win.top || y < win.bottom
    } else {
        false
    };
    x_ok && y_ok
}

#[derive(Clone, Copy, Default)]
struct AffineRef {
    x: f64,
    y: f64,
}

pub struct Video {
    frame: Vec<u32>,
    cycles: u32,
    frame_drawn: bool,
    bg_affine: [AffineRef; 2],
    win0: Window,
    win1: Window,
}

impl Video {
    pub fn new() -> Self {
        Self {
            frame: vec![0xFF00_0000; SCREEN_WIDTH * SCREEN_HEIGHT],
            cycles: 0,
            frame_drawn: false,
            bg_affine: [AffineRef::default(); 2],
            win0: Window::default(),
            win1: Window::default(),
        }
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.frame
    }

    /// Returns (and clears) whether a whole frame completed since the last call.
    pub fn take_frame_drawn(&mut self) -> bool {
        std::mem::take(&mut self.frame_drawn)
    }

    /// Advances the scan state machine by `cycles` CPU cycles, drawing a
    /// scanline at the HDraw/HBlank boundary and rolling VCOUNT at the end
    /// of each scanline, matching `video_update`'s edge-detected transitions.
    pub fn step(&mut self, cycles: u32, io: &mut IoRegs, mem: &MemoryRegions) -> Vec<VideoEvent> {
        let mut events = Vec::new();
        let last_frame_cycles = self.cycles;
        self.cycles = (self.cycles + cycles) % CYCLES_FRAME;
        let frame_cycles = self.cycles;

        let last_line_cycles = last_frame_cycles % CYCLES_SCANLINE;
        let line_cycles = frame_cycles % CYCLES_SCANLINE;
        let vcount = io.vcount(); // current VCOUNT before any update this call

        if line_cycles >= CYCLES_HDRAW && last_line_cycles < CYCLES_HDRAW {
            if (vcount as usize) < SCREEN_HEIGHT {
                self.draw_scanline(io, mem, vcount);
                self.update_affine_accumulators(io);
            }
            io.set_dispstat_hblank(true);
            if io.dispstat() & DSTAT_HBL_IRQ != 0 {
                io.raise_irq(io::INT_HBLANK);
            }
            if (vcount as usize) < SCREEN_HEIGHT {
                events.push(VideoEvent::HBlankDma);
            }
        }

        if line_cycles < last_line_cycles {
            io.set_dispstat_hblank(false);
            let next_vcount = (vcount + 1) % NUM_SCANLINES as u16;
            io.set_vcount(next_vcount);
            if next_vcount == 0 {
                self.reset_affine_accumulator(io, 0);
                self.reset_affine_accumulator(io, 1);
            } else if next_vcount as usize == SCREEN_HEIGHT {
                io.set_dispstat_vblank(true);
                events.push(VideoEvent::VBlankDma);
            } else if next_vcount as usize == SCREEN_HEIGHT + 1 {
                if io.dispstat() & DSTAT_VBL_IRQ != 0 {
                    io.raise_irq(io::INT_VBLANK);
                }
            } else if next_vcount == NUM_SCANLINES as u16 - 1 {
                io.set_dispstat_vblank(false);
            }

            let matches = next_vcount == io.vcount_compare();
            io.set_dispstat_vcount_match(matches);
            if matches && io.dispstat() & DSTAT_VCT_IRQ != 0 {
                io.raise_irq(io::INT_VCOUNT);
            }
        }

        if frame_cycles < last_frame_cycles {
            self.frame_drawn = true;
        }
        events
    }

    fn reset_affine_accumulator(&mut self, io: &IoRegs, bg: usize) {
        let (x0, y0) = io.bg_ref_point(bg + 2);
        self.bg_affine[bg].x = x0 as f64 / 256.0;
        self.bg_affine[bg].y = y0 as f64 / 256.0;
    }

    fn update_affine_accumulators(&mut self, io: &IoRegs) {
        for bg in 0..2 {
            let [_, pb, _, pd] = io.bg_affine(bg + 2);
            self.bg_affine[bg].x += fixed8p8(pb);
            self.bg_affine[bg].y += fixed8p8(pd);
        }
    }

    fn draw_scanline(&mut self, io: &IoRegs, mem: &MemoryRegions, y: u16) {
        self.win0 = Window {
            right: (io.window_h(0) & 0xFF) as i32,
            left: (io.window_h(0) >> 8) as i32,
            bottom: (io.window_v(0) & 0xFF) as i32,
            top: (io.window_v(0) >> 8) as i32,
        };
        self.win1 = Window {
            right: (io.window_h(1) & 0xFF) as i32,
            left: (io.window_h(1) >> 8) as i32,
            bottom: (io.window_v(1) & 0xFF) as i32,
            top: (io.window_v(1) >> 8) as i32,
        };

        let forced_blank = io.dispcnt() & DCNT_BLANK != 0;
        self.draw_backdrop(mem, y as usize, forced_blank);
        if forced_blank {
            return;
        }

        let mode = io.dispcnt() & 7;
        match mode {
            0 | 1 | 2 => self.draw_tiled(io, mem, mode, y as usize),
            3 | 4 | 5 => self.draw_bitmap(io, mem, mode, y as usize),
            _ => {}
        }
    }

    fn draw_backdrop(&mut self, mem: &MemoryRegions, y: usize, forced_blank: bool) {
        let pixel = u16::from_le_bytes([mem.palette()[0], mem.palette()[1]]);
        let color = rgb555(if forced_blank { 0x7FFF } else { pixel });
        let row = y * SCREEN_WIDTH;
        self.frame[row..row + SCREEN_WIDTH].fill(color);
    }

    fn draw_pixel_culled(&mut self, io: &IoRegs, bg: usize, x: i32, y: usize, pixel: u16) {
        if x < 0 || x as usize >= SCREEN_WIDTH {
            return;
        }
        let enable_win0 = io.dispcnt() & DCNT_WIN0 != 0;
        let enable_win1 = io.dispcnt() & DCNT_WIN1 != 0;
        let enable_winobj = io.dispcnt() & DCNT_WINOBJ != 0;
        let enable_winout = enable_win0 || enable_win1 || enable_winobj;

        let inside_win0 = enable_win0 && in_window(x, y as i32, self.win0);
        let inside_win1 = enable_win1 && in_window(x, y as i32, self.win1);

        if inside_win0 {
            if io.winin() & (1 << bg) == 0 {
                return;
            }
        } else if inside_win1 {
            if io.winin() & (1 << (8 + bg)) == 0 {
                return;
            }
        } else if enable_winout && io.winout() & (1 << bg) == 0 {
            return;
        }

        self.frame[y * SCREEN_WIDTH + x as usize] = rgb555(pixel);
    }

    fn draw_tiled(&mut self, io: &IoRegs, mem: &MemoryRegions, mode: u16, y: usize) {
        for pri in (0..4).rev() {
            for bg in (0..4).rev() {
                if io.dispcnt() & DCNT_BG[bg] == 0 {
                    continue;
                }
                if io.bgcnt(bg) & 3 != pri {
                    continue;
                }
                self.draw_tiled_bg(io, mem, mode, bg, y);
            }
            if io.dispcnt() & DCNT_OBJ != 0 {
                self.draw_sprites(io, mem, mode, pri as i32, y);
            }
        }
    }

    fn draw_tiled_bg(&mut self, io: &IoRegs, mem: &MemoryRegions, mode: u16, bg: usize, y: usize) {
        if mode == 1 && bg == 3 {
            return;
        }
        if mode == 2 && (bg == 0 || bg == 1) {
            return;
        }

        let bgcnt = io.bgcnt(bg) as u32;
        let hofs = io.bg_hofs(bg) as i32;
        let vofs = io.bg_vofs(bg) as i32;
        let tile_base = ((bgcnt >> 2) & 3) * 0x4000;
        let map_base = ((bgcnt >> 8) & 0x1F) * 0x800;
        let overflow_wraps = bgcnt & (1 << 13) != 0;
        let screen_size = ((bgcnt >> 14) & 3) as usize;
        let colors_256 = bgcnt & (1 << 7) != 0;

        let is_affine = (mode == 1 && bg == 2) || (mode == 2 && (bg == 2 || bg == 3));
        let (mut affine_x, mut affine_y, pa, pc) = if is_affine {
            let a = &self.bg_affine[bg - 2];
            let [pa_raw, _, pc_raw, _] = io.bg_affine(bg);
            (a.x, a.y, fixed8p8(pa_raw), fixed8p8(pc_raw))
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        let bg_width = BG_WIDTH[is_affine as usize][screen_size];
        let bg_height = BG_HEIGHT[is_affine as usize][screen_size];

        for x in 0..SCREEN_WIDTH as i32 {
            let mut i = if is_affine { affine_x.floor() as i32 } else { x + hofs };
            let mut j = if is_affine { affine_y.floor() as i32 } else { y as i32 + vofs };
            if !is_affine || overflow_wraps {
                i &= bg_width - 1;
                j &= bg_height - 1;
            }
            let pixel = if is_affine {
                bg_affine_access(mem, i, j, bg_width, bg_height, tile_base, map_base)
            } else {
                bg_regular_access(mem, i, j, bg_width, bg_height, tile_base, map_base, screen_size, colors_256)
            };
            if let Some(pixel) = pixel {
                self.draw_pixel_culled(io, bg, x, y, pixel);
            }
            affine_x += pa;
            affine_y += pc;
        }
    }

    fn draw_sprites(&mut self, io: &IoRegs, mem: &MemoryRegions, mode: u16, pri: i32, y: usize) {
        let oam = mem.oam();
        for n in (0..128).rev() {
            let base = n * 8;
            let attr0 = u16::from_le_bytes([oam[base], oam[base + 1]]);
            let attr1 = u16::from_le_bytes([oam[base + 2], oam[base + 3]]);
            let attr2 = u16::from_le_bytes([oam[base + 4], oam[base + 5]]);

            let mut sprite_y = (attr0 & 0xFF) as i32;
            let obj_mode = (attr0 >> 8) & 3;
            let colors_256 = attr0 & (1 << 13) != 0;
            let shape = ((attr0 >> 14) & 3) as usize;

            let mut sprite_x = (attr1 & 0x1FF) as i32;
            let affine_index = ((attr1 >> 9) & 0x1F) as usize;
            let mut hflip = attr1 & (1 << 12) != 0;
            let mut vflip = attr1 & (1 << 13) != 0;
            let size = ((attr1 >> 14) & 3) as usize;

            let tile_no = (attr2 & 0x3FF) as i32;
            let priority = ((attr2 >> 10) & 3) as i32;
            let palette_no = ((attr2 >> 12) & 0xF) as i32;

            if obj_mode == 2 || priority != pri {
                continue;
            }

            let is_affine = obj_mode == 1 || obj_mode == 3;
            let bbox_scale = if obj_mode == 3 { 2 } else { 1 };
            let sprite_width = SPRITE_WIDTH[shape][size];
            let sprite_height = SPRITE_HEIGHT[shape][size];
            let bbox_width = sprite_width * bbox_scale;
            let bbox_height = sprite_height * bbox_scale;

            if sprite_x + bbox_width >= 512 {
                sprite_x -= 512;
            }
            if sprite_y + bbox_height >= 256 {
                sprite_y -= 256;
            }
            if (y as i32) < sprite_y || y as i32 >= sprite_y + bbox_height {
                continue;
            }

            let bbox_cx = bbox_width / 2;
            let bbox_cy = bbox_height / 2;
            let sprite_cx = sprite_width / 2;
            let sprite_cy = sprite_height / 2;

            let (pa, pb, pc, pd) = if is_affine {
                hflip = false;
                vflip = false;
                let abase = affine_index * 32;
                (
                    fixed8p8(u16::from_le_bytes([oam[abase + 6], oam[abase + 7]])),
                    fixed8p8(u16::from_le_bytes([oam[abase + 14], oam[abase + 15]])),
                    fixed8p8(u16::from_le_bytes([oam[abase + 22], oam[abase + 23]])),
                    fixed8p8(u16::from_le_bytes([oam[abase + 30], oam[abase + 31]])),
                )
            } else {
                (1.0, 0.0, 0.0, 1.0)
            };

            let j = y as i32 - sprite_y;
            for i in 0..bbox_width {
                let texture_x = sprite_cx + (pa * (i - bbox_cx) as f64 + pb * (j - bbox_cy) as f64).floor() as i32;
                let texture_y = sprite_cy + (pc * (i - bbox_cx) as f64 + pd * (j - bbox_cy) as f64).floor() as i32;
                if let Some(pixel) = sprite_access(
                    mem,
                    tile_no,
                    texture_x,
                    texture_y,
                    sprite_width,
                    sprite_height,
                    hflip,
                    vflip,
                    colors_256,
                    palette_no,
                    mode,
                    io.dispcnt() & DCNT_OBJ_1D != 0,
                ) {
                    self.draw_pixel_culled(io, 4, sprite_x + i, y, pixel);
                }
            }
        }
    }

    fn draw_bitmap(&mut self, io: &IoRegs, mem: &MemoryRegions, mode: u16, y: usize) {
        let bg = 2;
        let a = &self.bg_affine[bg - 2];
        let [pa_raw, _, pc_raw, _] = io.bg_affine(bg);
        let mut affine_x = a.x;
        let mut affine_y = a.y;
        let pa = fixed8p8(pa_raw);
        let pc = fixed8p8(pc_raw);

        for x in 0..SCREEN_WIDTH as i32 {
            let i = affine_x.floor() as i32;
            let j = affine_y.floor() as i32;
            if let Some(pixel) = bitmap_access(io, mem, i, j, mode) {
                self.draw_pixel_culled(io, bg, x, y, pixel);
            }
            affine_x += pa;
            affine_y += pc;
        }

        for pri in (0..4).rev() {
            self.draw_sprites(io, mem, mode, pri, y);
        }
    }
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

fn fixed8p8(raw: u16) -> f64 {
    (raw as i16) as f64 / 256.0
}

fn rgb555(pixel: u16) -> u32 {
    let red = (pixel & 0x1F) as u32;
    let green = ((pixel >> 5) & 0x1F) as u32;
    let blue = ((pixel >> 10) & 0x1F) as u32;
    let red = (red << 3) | (red >> 2);
    let green = (green << 3) | (green >> 2);
    let blue = (blue << 3) | (blue >> 2);
    0xFF00_0000 | (blue << 16) | (green << 8) | red
}

fn tile_pixel(
    mem: &MemoryRegions,
    tile_address: u32,
    x: i32,
    y: i32,
    hflip: bool,
    vflip: bool,
    colors_256: bool,
    palette_offset: u32,
    palette_no: i32,
) -> Option<u16> {
    let x = if hflip { 7 - x } else { x };
    let y = if vflip { 7 - y } else { y };
    let vram = mem.vram();
    let tile = tile_address as usize;

    if colors_256 {
        let index = vram[tile + (y * 8 + x) as usize];
        if index == 0 {
            return None;
        }
        let off = (palette_offset + index as u32 * 2) as usize;
        Some(u16::from_le_bytes([mem.palette()[off], mem.palette()[off + 1]]))
    } else {
        let packed = vram[tile + (y * 4 + x / 2) as usize];
        let index = (packed >> (if x % 2 == 1 { 4 } else { 0 })) & 0xF;
        if index == 0 {
            return None;
        }
        let off = (palette_offset + palette_no as u32 * 32 + index as u32 * 2) as usize;
        Some(u16::from_le_bytes([mem.palette()[off], mem.palette()[off + 1]]))
    }
}

fn bg_regular_access(
    mem: &MemoryRegions,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    tile_base: u32,
    map_base: u32,
    screen_size: usize,
    colors_256: bool,
) -> Option<u16> {
    let map_x = (x / 8) % (w / 8);
    let map_y = (y / 8) % (h / 8);
    let quad_x = 32 * 32;
    let quad_y = 32 * 32 * if screen_size == 3 { 2 } else { 1 };
    let map_index = (map_y / 32) * quad_y + (map_x / 32) * quad_x + (map_y % 32) * 32 + (map_x % 32);
    let off = (map_base + map_index as u32 * 2) as usize;
    let info = u16::from_le_bytes([mem.vram()[off], mem.vram()[off + 1]]);
    let tile_no = (info & 0x3FF) as u32;
    let hflip = info & (1 << 10) != 0;
    let vflip = info & (1 << 11) != 0;
    let palette_no = ((info >> 12) & 0xF) as i32;

    let tile_address = tile_base + tile_no * if colors_256 { 64 } else { 32 };
    if tile_address >= 0x1_0000 {
        return None;
    }
    tile_pixel(mem, tile_address, x % 8, y % 8, hflip, vflip, colors_256, 0, palette_no)
}

fn bg_affine_access(mem: &MemoryRegions, x: i32, y: i32, w: i32, h: i32, tile_base: u32, map_base: u32) -> Option<u16> {
    if x < 0 || x >= w || y < 0 || y >= h {
        return None;
    }
    let map_x = (x / 8) % (w / 8);
    let map_y = (y / 8) % (h / 8);
    let map_index = map_y * (w / 8) + map_x;
    let tile_no = mem.vram()[(map_base + map_index as u32) as usize] as u32;
    let tile_address = tile_base + tile_no * 64;
    if tile_address >= 0x1_0000 {
        return None;
    }
    tile_pixel(mem, tile_address, x % 8, y % 8, false, false, true, 0, 0)
}

#[allow(clippy::too_many_arguments)]
fn sprite_access(
    mem: &MemoryRegions,
    mut tile_no: i32,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    hflip: bool,
    vflip: bool,
    colors_256: bool,
    palette_no: i32,
    mode: u16,
    obj_1d: bool,
) -> Option<u16> {
    if x < 0 || x >= w || y < 0 || y >= h {
        return None;
    }
    let x = if hflip { w - 1 - x } else { x };
    let y = if vflip { h - 1 - y } else { y };

    let stride = if obj_1d { w / 8 } else if colors_256 { 16 } else { 32 };
    let increment = if colors_256 { 2 } else { 1 };
    let count_y = (y / 8) * stride * increment;
    let count_x = (x / 8) * increment;

    tile_no += count_y;
    if obj_1d {
        tile_no += count_x;
    } else {
        tile_no = (tile_no & !0x1F) | ((tile_no + count_x) & 0x1F);
    }
    tile_no &= 0x3FF;

    let bitmap_mode = (3..=5).contains(&mode);
    if bitmap_mode && tile_no < 512 {
        return None;
    }

    let tile_address = 0x1_0000 + tile_no as u32 * 32;
    tile_pixel(mem, tile_address, x % 8, y % 8, false, false, colors_256, 0x200, palette_no)
}

fn bitmap_access(io: &IoRegs, mem: &MemoryRegions, x: i32, y: i32, mode: u16) -> Option<u16> {
    let w = if mode == 5 { 160 } else { SCREEN_WIDTH as i32 };
    let h = if mode == 5 { 128 } else { SCREEN_HEIGHT as i32 };
    if x < 0 || x >= w || y < 0 || y >= h {
        return None;
    }

    if mode == 4 {
        let page_flip = io.dispcnt() & DCNT_PAGE != 0;
        let off = (if page_flip { 0xA000 } else { 0 }) + (y * w + x) as usize;
        let index = mem.vram()[off];
        if index == 0 {
            return None;
        }
        let poff = index as usize * 2;
        Some(u16::from_le_bytes([mem.palette()[poff], mem.palette()[poff + 1]]))
    } else {
        let off = ((y * w + x) * 2) as usize;
        Some(u16::from_le_bytes([mem.vram()[off], mem.vram()[off + 1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Region;

    #[test]
    fn backdrop_fills_scanline_with_palette_zero() {
        let mut video = Video::new();
        let mut mem = MemoryRegions::new();
        mem.write16(Region::Palette, 0x0500_0000, 0x1234);
        video.draw_backdrop(&mem, 0, false);
        assert_eq!(video.frame[0], rgb555(0x1234));
        assert_eq!(video.frame[SCREEN_WIDTH - 1], rgb555(0x1234));
    }

    #[test]
    fn forced_blank_renders_white() {
        let mut video = Video::new();
        let mem = MemoryRegions::new();
        video.draw_backdrop(&mem, 0, true);
        assert_eq!(video.frame[0], rgb555(0x7FFF));
    }

    #[test]
    fn hblank_event_fires_once_per_scanline_only_while_visible() {
        let mut video = Video::new();
        let mut io = IoRegs::new();
        let mem = MemoryRegions::new();
        let events = video.step(CYCLES_HDRAW, &mut io, &mem);
        assert_eq!(events, vec![VideoEvent::HBlankDma]);
    }

    #[test]
    fn vblank_begins_at_scanline_160() {
        let mut video = Video::new();
        let mut io = IoRegs::new();
        let mem = MemoryRegions::new();
        for _ in 0..SCREEN_HEIGHT {
            video.step(CYCLES_HDRAW, &mut io, &mem);
            video.step(CYCLES_SCANLINE - CYCLES_HDRAW, &mut io, &mem);
        }
        assert_eq!(io.dispstat() & 1, 1);
    }

    #[test]
    fn rgb555_expands_5_bit_channels() {
        assert_eq!(rgb555(0x7FFF) & 0xFF, 0xFF);
        assert_eq!((rgb555(0x7FFF) >> 8) & 0xFF, 0xFF);
        assert_eq!((rgb555(0x7FFF) >> 16) & 0xFF, 0xFF);
    }
}
