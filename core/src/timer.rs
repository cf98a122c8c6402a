//! The 4 hardware timers (spec §3 "Timer descriptor", §4.5): prescaled or
//! cascaded 16-bit counters that reload on overflow, drive the two sound
//! FIFOs' refill cadence, and can raise an IRQ per channel.

use crate::io::IoRegs;

/// Advances every enabled timer by `cycles` CPU cycles. Returns the IE/IF
/// bits to raise and whether either FIFO needs a DMA-driven refill this
/// tick (spec §4.5's "FIFO tick -> special-timing DMA" chain).
pub struct TimerResult {
    pub irq_bits: u16,
    pub fifo_a_refill: bool,
    pub fifo_b_refill: bool,
}

pub fn step(io: &mut IoRegs, cycles: u32) -> TimerResult {
    let mut overflow = false;
    let mut irq_bits = 0u16;
    let mut fifo_a_refill = false;
    let mut fifo_b_refill = false;

    let fifo_a_timer = ((io.soundcnt_h() >> 10) & 1) as usize;
    let fifo_b_timer = ((io.soundcnt_h() >> 14) & 1) as usize;

    for i in 0..4 {
        if !io.timer[i].enabled() {
            overflow = false;
            continue;
        }

        let increment = if io.timer[i].cascade() {
            if overflow { 1 } else { 0 }
        } else {
            io.timer[i].elapsed += cycles;
            let freq = io.timer[i].prescale();
            if io.timer[i].elapsed >= freq {
                let inc = io.timer[i].elapsed / freq;
                io.timer[i].elapsed %= freq;
                inc
            } else {
                0
            }
        };

        overflow = false;
        for _ in 0..increment {
            let (next, wrapped) = io.timer[i].counter.overflowing_add(1);
            if wrapped {
                io.timer[i].counter = io.timer[i].reload;
                overflow = true;
            } else {
                io.timer[i].counter = next;
            }
        }

        if overflow {
            if fifo_a_timer == i {
                io.fifo_a_ticks = (io.fifo_a_ticks + 1) % 16;
                if io.fifo_a_ticks == 0 {
                    fifo_a_refill = true;
                }
            }
            if fifo_b_timer == i {
                io.fifo_b_ticks = (io.fifo_b_ticks + 1) % 16;
                if io.fifo_b_ticks == 0 {
                    fifo_b_refill = true;
                }
            }
            if io.timer[i].irq() {
                irq_bits |= crate::io::INT_TIMER[i];
            }
        }
    }

    if fifo_a_refill {
        io.fifo_a_refill = true;
    }
    if fifo_b_refill {
        io.fifo_b_refill = true;
    }

    TimerResult { irq_bits, fifo_a_refill, fifo_b_refill }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::REG_TIMER_BASE;

    #[test]
    fn timer0_overflow_reloads_and_raises_irq() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_TIMER_BASE[0], 0xFFFE); // reload value
        io.write_halfword(REG_TIMER_BASE[0] + 2, 0xC0); // enable + IRQ, prescale /1

        let r1 = step(&mut io, 1);
        assert_eq!(r1.irq_bits, 0);
        assert_eq!(io.timer[0].counter, 0xFFFF);

        let r2 = step(&mut io, 1);
        assert_eq!(r2.irq_bits, crate::io::INT_TIMER[0]);
        assert_eq!(io.timer[0].counter, 0xFFFE);
    }

    #[test]
    fn cascaded_timer1_ticks_only_on_timer0_overflow() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_TIMER_BASE[0], 0xFFFF);
        io.write_halfword(REG_TIMER_BASE[0] + 2, 0x80); // enabled, prescale /1
        io.write_halfword(REG_TIMER_BASE[1], 0);
        io.write_halfword(REG_TIMER_BASE[1] + 2, 0x84); // enabled, cascade

        step(&mut io, 1); // timer0 overflows
        assert_eq!(io.timer[1].counter, 1);

        step(&mut io, 1); // timer0 far from overflow now
        assert_eq!(io.timer[1].counter, 1);
    }

    #[test]
    fn disabled_timer_does_not_advance() {
        let mut io = IoRegs::new();
        io.write_halfword(REG_TIMER_BASE[2], 0);
        let result = step(&mut io, 1000);
        assert_eq!(result.irq_bits, 0);
        assert_eq!(io.timer[2].counter, 0);
    }
}
