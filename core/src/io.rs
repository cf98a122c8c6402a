//! The memory-mapped I/O register file (spec §3 "I/O register file", §4.3).
//!
//! Registers are stored as a flat array of halfwords covering the whole
//! `0x04000000..0x04000400` aperture, matching spec's framing of the file
//! as "a single aggregate of packed halfwords". Each writable register is
//! masked on write (reserved bits stay put) and on read (some bits always
//! read zero even though they are writable, e.g. DMA "start" bits).
//!
//! Side effects that reach outside the register file itself (DMA dispatch,
//! timer reload, halt, FIFO enqueue, keypad IRQ re-evaluation) are not
//! performed here — a write returns a small [`IoEvent`] list that
//! [`crate::machine::Gba`] acts on immediately afterwards. This keeps the
//! register file a leaf module with no dependency on DMA/timer/video,
//! matching spec §9's suggestion to "model DMA as a post-instruction
//! deferred action scheduled by the I/O write handler".

use std::collections::VecDeque;

pub const REG_DISPCNT: u32 = 0x000;
pub const REG_DISPSTAT: u32 = 0x004;
pub const REG_VCOUNT: u32 = 0x006;
pub const REG_BG0CNT: u32 = 0x008;
pub const REG_BG_HOFS: [u32; 4] = [0x010, 0x014, 0x018, 0x01C];
pub const REG_BG_VOFS: [u32; 4] = [0x012, 0x016, 0x01A, 0x01E];
pub const REG_BG2PA: u32 = 0x020;
pub const REG_BG3PA: u32 = 0x030;
pub const REG_WIN0H: u32 = 0x040;
pub const REG_WIN1H: u32 = 0x042;
pub const REG_WIN0V: u32 = 0x044;
pub const REG_WIN1V: u32 = 0x046;
pub const REG_WININ: u32 = 0x048;
pub const REG_WINOUT: u32 = 0x04A;
pub const REG_MOSAIC: u32 = 0x04C;
pub const REG_BLDCNT: u32 = 0x050;
pub const REG_BLDALPHA: u32 = 0x052;
pub const REG_BLDY: u32 = 0x054;
pub const REG_SOUNDCNT_H: u32 = 0x082;
pub const REG_SOUNDCNT_X: u32 = 0x084;
pub const REG_FIFO_A: u32 = 0x0A0;
pub const REG_FIFO_B: u32 = 0x0A4;
pub const REG_DMA_BASE: [u32; 4] = [0x0B0, 0x0BC, 0x0C8, 0x0D4];
pub const REG_TIMER_BASE: [u32; 4] = [0x100, 0x104, 0x108, 0x10C];
pub const REG_KEYINPUT: u32 = 0x130;
pub const REG_KEYCNT: u32 = 0x132;
pub const REG_IE: u32 = 0x200;
pub const REG_IF: u32 = 0x202;
pub const REG_WAITCNT: u32 = 0x204;
pub const REG_IME: u32 = 0x208;
pub const REG_POSTFLG: u32 = 0x300;
pub const REG_HALTCNT: u32 = 0x301;

pub const INT_VBLANK: u16 = 1 << 0;
pub const INT_HBLANK: u16 = 1 << 1;
pub const INT_VCOUNT: u16 = 1 << 2;
pub const INT_TIMER: [u16; 4] = [1 << 3, 1 << 4, 1 << 5, 1 << 6];
pub const INT_DMA: [u16; 4] = [1 << 8, 1 << 9, 1 << 10, 1 << 11];
pub const INT_KEYPAD: u16 = 1 << 12;

pub const AUDIO_FIFO_CAPACITY: usize = 8192;

/// DMA trigger classes (spec §4.4 / GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmaTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl DmaTiming {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => DmaTiming::Immediate,
            1 => DmaTiming::VBlank,
            2 => DmaTiming::HBlank,
            _ => DmaTiming::Special,
        }
    }
}

/// One DMA channel's latched registers plus its "active" working shadows
/// (spec §3 "DMA descriptor").
#[derive(Clone, Copy, Debug, Default)]
pub struct DmaChannel {
    pub src: u32,
    pub dst: u32,
    pub count: u16,
    pub control: u16,
    pub working_src: u32,
    pub working_dst: u32,
    pub working_count: u32,
}

impl DmaChannel {
    pub fn enabled(&self) -> bool {
        self.control & (1 << 15) != 0
    }
    pub fn repeat(&self) -> bool {
        self.control & (1 << 9) != 0
    }
    pub fn word_size(&self) -> bool {
        self.control & (1 << 10) != 0
    }
    pub fn irq(&self) -> bool {
        self.control & (1 << 14) != 0
    }
    pub fn dst_ctrl(&self) -> u8 {
        ((self.control >> 5) & 3) as u8
    }
    pub fn src_ctrl(&self) -> u8 {
        ((self.control >> 7) & 3) as u8
    }
    pub fn timing(&self) -> DmaTiming {
        DmaTiming::from_bits(self.control >> 12)
    }
}

/// One timer's latched registers plus its sub-tick accumulator.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerChannel {
    pub counter: u16,
    pub reload: u16,
    pub control: u16,
    pub elapsed: u32,
}

impl TimerChannel {
    pub fn enabled(&self) -> bool {
        self.control & (1 << 7) != 0
    }
    pub fn cascade(&self) -> bool {
        self.control & (1 << 2) != 0
    }
    pub fn irq(&self) -> bool {
        self.control & (1 << 6) != 0
    }
    pub fn prescale(&self) -> u32 {
        match self.control & 3 {
            0 => 1,
            1 => 64,
            2 => 256,
            _ => 1024,
        }
    }
}

/// A side effect raised by a register write, to be acted on by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoEvent {
    DmaEnabled(usize),
    TimerEnabled(usize),
    Halted,
    KeypadRecheck,
    FifoAPush(i8),
    FifoBPush(i8),
}

pub struct IoRegs {
    raw: [u16; 0x200],
    pub dma: [DmaChannel; 4],
    pub timer: [TimerChannel; 4],
    pub fifo_a: VecDeque<i8>,
    pub fifo_b: VecDeque<i8>,
    pub fifo_a_ticks: u8,
    pub fifo_b_ticks: u8,
    pub fifo_a_refill: bool,
    pub fifo_b_refill: bool,
    pub halted: bool,
    pub keyinput: u16,
}

impl IoRegs {
    pub fn new() -> Self {
        Self {
            raw: [0; 0x200],
            dma: [DmaChannel::default(); 4],
            timer: [TimerChannel::default(); 4],
            fifo_a: VecDeque::with_capacity(AUDIO_FIFO_CAPACITY),
            fifo_b: VecDeque::with_capacity(AUDIO_FIFO_CAPACITY),
            fifo_a_ticks: 0,
            fifo_b_ticks: 0,
            fifo_a_refill: false,
            fifo_b_refill: false,
            halted: false,
            keyinput: 0x03FF,
        }
    }

    fn idx(offset: u32) -> usize {
        (offset as usize & 0x3FE) >> 1
    }

    fn raw_get(&self, offset: u32) -> u16 {
        self.raw[Self::idx(offset)]
    }

    fn raw_set(&mut self, offset: u32, value: u16) {
        self.raw[Self::idx(offset)] = value;
    }

    /// Write-mask for a given halfword register offset (reserved bits are
    /// dropped, preserving whatever was already latched there).
    fn write_mask(offset: u32) -> u16 {
        match offset {
            REG_DISPCNT => 0xFFFF,
            REG_DISPSTAT => 0xFFF8, // bits 0-2 (VBlank/HBlank/VCount flags) are read-only
            o if o == REG_BG0CNT || o == REG_BG0CNT + 2 => 0xFFFF,
            o if o == REG_BG0CNT + 4 || o == REG_BG0CNT + 6 => 0xDFFF, // affine BGCNT: bit13 unused
            o if REG_BG_HOFS.contains(&o) || REG_BG_VOFS.contains(&o) => 0x01FF,
            REG_WIN0H | REG_WIN1H | REG_WIN0V | REG_WIN1V => 0xFFFF,
            REG_WININ | REG_WINOUT => 0x3F3F,
            REG_MOSAIC => 0xFFFF,
            REG_BLDCNT => 0x3FFF,
            REG_BLDALPHA => 0x1F1F,
            REG_BLDY => 0x001F,
            REG_IE => 0x3FFF,
            REG_IF => 0x3FFF, // special ack-by-clear semantics, see write_if
            REG_WAITCNT => 0xFFFF,
            REG_IME => 0x0001,
            REG_KEYCNT => 0xFFFF,
            o if o == REG_HALTCNT - 1 => 0x00FF, // POSTFLG/HALTCNT packed halfword
            _ => 0xFFFF,
        }
    }

    /// Read mask: bits that always read as zero regardless of write mask
    /// (spec §4.3: "some bits read as zero even if writable, such as the
    /// 'start' bits of DMA control").
    fn read_mask(offset: u32) -> u16 {
        for base in REG_DMA_BASE {
            if offset == base + 10 {
                // DMA CNT_H: bits 0-4 (word count high bits) are write-only.
                return 0xFFE0;
            }
        }
        0xFFFF
    }

    pub fn read_halfword(&mut self, offset: u32) -> u16 {
        let value = match offset {
            REG_KEYINPUT => {
                self.recheck_keypad_irq();
                self.keyinput
            }
            o if (REG_DMA_BASE).contains(&o) => self.dma_raw_read(o),
            o if dma_field(o).is_some() => self.dma_raw_read(o),
            o if (REG_TIMER_BASE).contains(&o) => self.timer_raw_read(o),
            o if timer_field(o).is_some() => self.timer_raw_read(o),
            _ => self.raw_get(offset),
        };
        value & Self::read_mask(offset)
    }

    pub fn read_word(&mut self, offset: u32) -> u32 {
        let lo = self.read_halfword(offset & !3) as u32;
        let hi = self.read_halfword((offset & !3) + 2) as u32;
        lo | (hi << 16)
    }

    pub fn write_halfword(&mut self, offset: u32, raw_value: u16) -> Vec<IoEvent> {
        let offset = offset & 0x3FE;
        let mut events = Vec::new();

        if offset == REG_IF {
            // Writing IF clears (ANDs NOT) the written bits.
            let cur = self.raw_get(offset);
            self.raw_set(offset, cur & !raw_value);
            return events;
        }
        if offset == REG_HALTCNT - 1 {
            // POSTFLG (low byte) / HALTCNT (high byte) share a halfword.
            let cur = self.raw_get(offset) & 0x00FF;
            let mask = Self::write_mask(offset);
            self.raw_set(offset, (cur & !mask) | (raw_value & mask));
            if raw_value & 0xFF00 != 0 {
                self.halted = true;
                events.push(IoEvent::Halted);
            }
            return events;
        }
        if offset == REG_FIFO_A || offset == REG_FIFO_A + 2 {
            push_fifo_bytes(&mut self.fifo_a, raw_value);
            events.push(IoEvent::FifoAPush((raw_value & 0xFF) as i8));
            return events;
        }
        if offset == REG_FIFO_B || offset == REG_FIFO_B + 2 {
            push_fifo_bytes(&mut self.fifo_b, raw_value);
            events.push(IoEvent::FifoBPush((raw_value & 0xFF) as i8));
            return events;
        }
        if offset == REG_KEYCNT {
            self.set_masked(offset, raw_value);
            events.push(IoEvent::KeypadRecheck);
            return events;
        }
        if let Some((ch, field)) = dma_field(offset) {
            self.write_dma_field(ch, field, raw_value, &mut events);
            return events;
        }
        if let Some((ch, field)) = timer_field(offset) {
            self.write_timer_field(ch, field, raw_value, &mut events);
            return events;
        }

        self.set_masked(offset, raw_value);
        events
    }

    pub fn write_word(&mut self, offset: u32, value: u32) -> Vec<IoEvent> {
        let mut events = self.write_halfword(offset & !3, (value & 0xFFFF) as u16);
        events.extend(self.write_halfword((offset & !3) + 2, (value >> 16) as u16));
        events
    }

    pub fn write_byte(&mut self, offset: u32, value: u8) -> Vec<IoEvent> {
        let cur = self.raw_get_any(offset & !1);
        let shift = 8 * (offset & 1);
        let merged = (cur & !(0xFF << shift)) | ((value as u16) << shift);
        self.write_halfword(offset & !1, merged)
    }

    fn raw_get_any(&mut self, offset: u32) -> u16 {
        self.read_halfword(offset)
    }

    fn set_masked(&mut self, offset: u32, raw_value: u16) {
        let mask = Self::write_mask(offset);
        let cur = self.raw_get(offset);
        self.raw_set(offset, (cur & !mask) | (raw_value & mask));
    }

    // -- DMA -----------------------------------------------------------

    fn dma_raw_read(&self, offset: u32) -> u16 {
        for (ch, base) in REG_DMA_BASE.iter().enumerate() {
            if offset == *base + 10 {
                return self.dma[ch].control;
            }
        }
        0
    }

    fn write_dma_field(&mut self, ch: usize, field: DmaField, value: u16, events: &mut Vec<IoEvent>) {
        let d = &mut self.dma[ch];
        match field {
            DmaField::SrcLo => d.src = (d.src & 0xFFFF_0000) | value as u32,
            DmaField::SrcHi => d.src = (d.src & 0x0000_FFFF) | ((value as u32) << 16),
            DmaField::DstLo => d.dst = (d.dst & 0xFFFF_0000) | value as u32,
            DmaField::DstHi => d.dst = (d.dst & 0x0000_FFFF) | ((value as u32) << 16),
            DmaField::Count => d.count = value,
            DmaField::Control => {
                let was_enabled = d.enabled();
                d.control = value;
                if !was_enabled && d.enabled() {
                    d.working_src = d.src;
                    d.working_dst = d.dst;
                    let count = d.count as u32;
                    d.working_count = if count == 0 {
                        if ch == 3 { 0x1_0000 } else { 0x4000 }
                    } else {
                        count
                    };
                    events.push(IoEvent::DmaEnabled(ch));
                }
            }
        }
    }

    // -- Timers ----------------------------------------------------------

    fn timer_raw_read(&self, offset: u32) -> u16 {
        for (i, base) in REG_TIMER_BASE.iter().enumerate() {
            if offset == *base {
                return self.timer[i].counter;
            }
            if offset == *base + 2 {
                return self.timer[i].control;
            }
        }
        0
    }

    fn write_timer_field(&mut self, ch: usize, field: TimerField, value: u16, events: &mut Vec<IoEvent>) {
        let t = &mut self.timer[ch];
        match field {
            TimerField::Reload => t.reload = value,
            TimerField::Control => {
                let was_enabled = t.enabled();
                t.control = value & 0xC7;
                if !was_enabled && t.enabled() {
                    t.counter = t.reload;
                    t.elapsed = 0;
                    events.push(IoEvent::TimerEnabled(ch));
                }
            }
        }
    }

    // -- Misc accessors used by other components --------------------------

    pub fn dispcnt(&self) -> u16 {
        self.raw_get(REG_DISPCNT)
    }
    pub fn dispstat(&self) -> u16 {
        self.raw_get(REG_DISPSTAT)
    }
    pub fn set_dispstat_flags(&mut self, vblank: bool, hblank: bool, vcount_match: bool) {
        let cur = self.raw_get(REG_DISPSTAT) & !0x7;
        let flags = (vblank as u16) | ((hblank as u16) << 1) | ((vcount_match as u16) << 2);
        self.raw_set(REG_DISPSTAT, cur | flags);
    }
    pub fn set_vcount(&mut self, line: u16) {
        self.raw_set(REG_VCOUNT, line);
    }
    pub fn vcount(&self) -> u16 {
        self.raw_get(REG_VCOUNT)
    }
    pub fn vcount_compare(&self) -> u16 {
        (self.raw_get(REG_DISPSTAT) >> 8) & 0xFF
    }
    fn dispstat_flag(&self, bit: u16) -> bool {
        self.raw_get(REG_DISPSTAT) & bit != 0
    }
    pub fn set_dispstat_hblank(&mut self, value: bool) {
        self.set_dispstat_flags(self.dispstat_flag(1), value, self.dispstat_flag(4));
    }
    pub fn set_dispstat_vblank(&mut self, value: bool) {
        self.set_dispstat_flags(value, self.dispstat_flag(2), self.dispstat_flag(4));
    }
    pub fn set_dispstat_vcount_match(&mut self, value: bool) {
        self.set_dispstat_flags(self.dispstat_flag(1), self.dispstat_flag(2), value);
    }
    pub fn bgcnt(&self, n: usize) -> u16 {
        self.raw_get(REG_BG0CNT + (n as u32) * 2)
    }
    pub fn bg_hofs(&self, n: usize) -> u16 {
        self.raw_get(REG_BG_HOFS[n])
    }
    pub fn bg_vofs(&self, n: usize) -> u16 {
        self.raw_get(REG_BG_VOFS[n])
    }
    pub fn bg_affine(&self, bg: usize) -> [u16; 4] {
        let base = if bg == 2 { REG_BG2PA } else { REG_BG3PA };
        [
            self.raw_get(base),
            self.raw_get(base + 2),
            self.raw_get(base + 4),
            self.raw_get(base + 6),
        ]
    }
    pub fn bg_ref_point(&self, bg: usize) -> (i32, i32) {
        let base = if bg == 2 { REG_BG2PA } else { REG_BG3PA };
        let xl = self.raw_get(base + 8) as u32;
        let xh = self.raw_get(base + 10) as u32;
        let yl = self.raw_get(base + 12) as u32;
        let yh = self.raw_get(base + 14) as u32;
        let x = sign_extend28((xl | (xh << 16)) & 0x0FFF_FFFF);
        let y = sign_extend28((yl | (yh << 16)) & 0x0FFF_FFFF);
        (x, y)
    }
    pub fn window_h(&self, n: usize) -> u16 {
        self.raw_get(if n == 0 { REG_WIN0H } else { REG_WIN1H })
    }
    pub fn window_v(&self, n: usize) -> u16 {
        self.raw_get(if n == 0 { REG_WIN0V } else { REG_WIN1V })
    }
    pub fn winin(&self) -> u16 {
        self.raw_get(REG_WININ)
    }
    pub fn winout(&self) -> u16 {
        self.raw_get(REG_WINOUT)
    }
    pub fn mosaic(&self) -> u16 {
        self.raw_get(REG_MOSAIC)
    }
    pub fn bldcnt(&self) -> u16 {
        self.raw_get(REG_BLDCNT)
    }
    pub fn soundcnt_h(&self) -> u16 {
        self.raw_get(REG_SOUNDCNT_H)
    }
    pub fn ie(&self) -> u16 {
        self.raw_get(REG_IE)
    }
    pub fn keycnt(&self) -> u16 {
        self.raw_get(REG_KEYCNT)
    }
    pub fn if_(&self) -> u16 {
        self.raw_get(REG_IF)
    }
    pub fn raise_irq(&mut self, bits: u16) {
        let cur = self.raw_get(REG_IF);
        self.raw_set(REG_IF, cur | bits);
    }
    pub fn ime(&self) -> bool {
        self.raw_get(REG_IME) & 1 != 0
    }
    pub fn set_keyinput(&mut self, value: u16) {
        self.keyinput = value & 0x3FF;
    }

    /// Re-evaluates the keypad interrupt condition against the current
    /// KEYINPUT/KEYCNT state and raises INT_KEYPAD if it fires (spec §4.3:
    /// both a KEYCNT write and a KEYINPUT read re-arm this check).
    pub fn recheck_keypad_irq(&mut self) {
        let keycnt = self.keycnt();
        if keycnt & (1 << 14) == 0 {
            return; // keypad IRQ not enabled
        }
        let pressed = !self.keyinput & 0x3FF;
        let mask = keycnt & 0x3FF;
        let condition_and = keycnt & (1 << 15) != 0;
        let matched = pressed & mask;
        let fires = if condition_and { matched == mask } else { matched != 0 };
        if fires {
            self.raise_irq(INT_KEYPAD);
        }
    }
}

impl Default for IoRegs {
    fn default() -> Self {
        Self::new()
    }
}

fn sign_extend28(value: u32) -> i32 {
    crate::bits::sign_extend(value, 28)
}

fn push_fifo_bytes(fifo: &mut VecDeque<i8>, value: u16) {
    if fifo.len() + 2 > AUDIO_FIFO_CAPACITY {
        fifo.pop_front();
    }
    if fifo.len() + 1 > AUDIO_FIFO_CAPACITY {
        fifo.pop_front();
    }
    fifo.push_back((value & 0xFF) as i8);
    fifo.push_back((value >> 8) as i8);
}

#[derive(Clone, Copy)]
enum DmaField {
    SrcLo,
    SrcHi,
    DstLo,
    DstHi,
    Count,
    Control,
}

fn dma_field(offset: u32) -> Option<(usize, DmaField)> {
    for (ch, base) in REG_DMA_BASE.iter().enumerate() {
        let rel = offset.checked_sub(*base)?;
        let field = match rel {
            0 => DmaField::SrcLo,
            2 => DmaField::SrcHi,
            4 => DmaField::DstLo,
            6 => DmaField::DstHi,
            8 => DmaField::Count,
            10 => DmaField::Control,
            _ => continue,
        };
        return Some((ch, field));
    }
    None
}

#[derive(Clone, Copy)]
enum TimerField {
    Reload,
    Control,
}

fn timer_field(offset: u32) -> Option<(usize, TimerField)> {
    for (i, base) in REG_TIMER_BASE.iter().enumerate() {
        if offset == *base {
            return Some((i, TimerField::Reload));
        }
        if offset == *base + 2 {
            return Some((i, TimerField::Control));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_write_clears_bits() {
        let mut io = IoRegs::new();
        io.raise_irq(INT_VBLANK | INT_HBLANK);
        io.write_halfword(REG_IF, INT_VBLANK);
        assert_eq!(io.if_(), INT_HBLANK);
    }

    #[test]
    fn dma_enable_edge_latches_shadows_and_emits_event() {
        let mut io = IoRegs::new();
        io.write_word(REG_DMA_BASE[3], 0x0200_0000);
        io.write_word(REG_DMA_BASE[3] + 4, 0x0300_0000);
        io.write_halfword(REG_DMA_BASE[3] + 8, 16);
        let events = io.write_halfword(REG_DMA_BASE[3] + 10, 0x8400);
        assert_eq!(events, vec![IoEvent::DmaEnabled(3)]);
        assert_eq!(io.dma[3].working_src, 0x0200_0000);
        assert_eq!(io.dma[3].working_dst, 0x0300_0000);
        assert_eq!(io.dma[3].working_count, 16);
    }

    #[test]
    fn dma_enable_edge_only_on_transition() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_DMA_BASE[0] + 10, 0x8000);
        let events = io.write_halfword(REG_DMA_BASE[0] + 10, 0x8000);
        assert!(events.is_empty());
    }

    #[test]
    fn timer_enable_edge_reloads_counter() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_TIMER_BASE[0], 0xFFF0);
        let events = io.write_halfword(REG_TIMER_BASE[0] + 2, 0xC0);
        assert_eq!(events, vec![IoEvent::TimerEnabled(0)]);
        assert_eq!(io.timer[0].counter, 0xFFF0);
        assert_eq!(io.timer[0].elapsed, 0);
    }

    #[test]
    fn dma_cnt_h_start_bits_read_zero() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_DMA_BASE[0] + 10, 0xFFFF);
        assert_eq!(io.read_halfword(REG_DMA_BASE[0] + 10) & 0x001F, 0);
    }

    #[test]
    fn haltcnt_write_sets_halted() {
        let mut io = IoRegs::new();
        let events = io.write_byte(REG_HALTCNT, 0x00);
        assert_eq!(events, vec![IoEvent::Halted]);
        assert!(io.halted);
    }

    #[test]
    fn fifo_a_push_enqueues_two_bytes() {
        let mut io = IoRegs::new();
        io.write_word(REG_FIFO_A, 0x0000_1234);
        assert_eq!(io.fifo_a.len(), 2);
    }

    #[test]
    fn bg_affine_ref_point_sign_extends() {
        let mut io = IoRegs::new();
        io.write_word(REG_BG2PA + 8, 0xFFFF_FF00); // -256 in 20.8 fixed point
        assert_eq!(io.bg_ref_point(2).0, -256);
    }
}
