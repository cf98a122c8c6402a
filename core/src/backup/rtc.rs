//! Real-time clock over the cartridge GPIO pins (Seiko S-3511A protocol),
//! spec §3 "Cartridge backup: RTC". Driven three bits at a time (SCK/SIO/CS)
//! through `GPIODATA`/`GPIODIR`/`GPIOCNT` in the upper ROM aperture; see
//! [`crate::backup::Backup::gpio_write`].

use chrono::{Datelike, Local, Timelike};

pub const RTC_SCK: u16 = 1;
pub const RTC_SIO: u16 = 2;
pub const RTC_CS: u16 = 4;

const STATUS_24HOUR: u8 = 0x40;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Gpio {
    pub data: u16,
    pub direction: u16,
    pub read_enable: u16,
}

pub struct Rtc {
    state: u8,
    rbits: u64,
    num_rbits: u32,
    wbits: u64,
    num_wbits: u32,
}

impl Rtc {
    pub fn new() -> Self {
        Self { state: 0, rbits: 0, num_rbits: 0, wbits: 0, num_wbits: 0 }
    }

    /// Clock one GPIO edge. `gpio` is the live data latch (already updated
    /// with the new pin values by the caller); returns the SIO bit to drive
    /// back onto the latch when the line is configured for input.
    pub fn clock_edge(&mut self, gpio: &mut Gpio, prev_data: u16) {
        let rising_sck = (gpio.data & RTC_SCK) != 0 && (prev_data & RTC_SCK) == 0;
        if !((gpio.data & RTC_CS) != 0 && rising_sck) {
            return;
        }
        if gpio.direction & RTC_SIO != 0 {
            let bit = if gpio.data & RTC_SIO != 0 { 1 } else { 0 };
            self.write_bit(bit);
        } else if self.read_bit() != 0 {
            gpio.data |= RTC_SIO;
        } else {
            gpio.data &= !RTC_SIO;
        }
    }

    fn send_byte(&mut self, value: u8) {
        for i in 0..8 {
            self.rbits = (self.rbits << 1) | ((value as u64 >> i) & 1);
        }
        self.num_rbits += 8;
    }

    fn read_bit(&mut self) -> u16 {
        if self.num_rbits > 0 {
            self.num_rbits -= 1;
            ((self.rbits >> self.num_rbits) & 1) as u16
        } else {
            0
        }
    }

    fn write_bit(&mut self, value: u16) {
        self.wbits = (self.wbits << 1) | (value as u64 & 1);
        self.num_wbits += 1;

        if self.state == 0 {
            if self.num_wbits < 8 {
                return;
            }
            self.state = self.wbits as u8;
            self.rbits = 0;
            self.num_rbits = 0;
            self.wbits = 0;
            self.num_wbits = 0;

            match self.state {
                0x60 | 0x61 => self.state = 0,
                0x62 => {}
                0x63 => {
                    self.send_byte(STATUS_24HOUR);
                    self.state = 0;
                }
                0x64 => {}
                0x65 => {
                    self.send_date_time();
                    self.state = 0;
                }
                0x66 => {}
                0x67 => {
                    self.send_time();
                    self.state = 0;
                }
                _ => self.state = 0,
            }
        } else {
            let needed = match self.state {
                0x62 => 8,
                0x64 => 56,
                0x66 => 24,
                _ => {
                    self.state = 0;
                    return;
                }
            };
            if self.num_wbits < needed {
                return;
            }
            // Writes to status/date-time/time are accepted and discarded;
            // the host clock is the single source of truth.
            self.state = 0;
            self.wbits = 0;
            self.num_wbits = 0;
        }
    }

    fn send_date_time(&mut self) {
        let now = Local::now();
        self.send_byte(decimal_to_bcd((now.year() % 100) as u8));
        self.send_byte(decimal_to_bcd(now.month() as u8));
        self.send_byte(decimal_to_bcd(now.day() as u8));
        self.send_byte(decimal_to_bcd(now.weekday().num_days_from_monday() as u8));
        self.send_byte(decimal_to_bcd(now.hour() as u8));
        self.send_byte(decimal_to_bcd(now.minute() as u8));
        self.send_byte(decimal_to_bcd(now.second() as u8));
    }

    fn send_time(&mut self) {
        let now = Local::now();
        self.send_byte(decimal_to_bcd(now.hour() as u8));
        self.send_byte(decimal_to_bcd(now.minute() as u8));
        self.send_byte(decimal_to_bcd(now.second() as u8));
    }
}

impl Default for Rtc {
    fn default() -> Self {
        Self::new()
    }
}

fn decimal_to_bcd(x: u8) -> u8 {
    ((x / 10) << 4) | (x % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_to_bcd_basic() {
        assert_eq!(decimal_to_bcd(42), 0x42);
        assert_eq!(decimal_to_bcd(0), 0);
        assert_eq!(decimal_to_bcd(59), 0x59);
    }

    #[test]
    fn read_status_command_yields_24_hour_flag() {
        let mut rtc = Rtc::new();
        // Command 0x63 (read status), MSB first.
        for bit in (0..8).rev() {
            rtc.write_bit(((0x63u16 >> bit) & 1) as u16);
        }
        assert_eq!(rtc.num_rbits, 8);
        assert_eq!(rtc.read_bit(), 1); // top bit of STATUS_24HOUR (0x40)
    }

    #[test]
    fn clock_edge_drives_sio_from_rtc_when_input() {
        let mut rtc = Rtc::new();
        rtc.send_byte(0x80);
        let mut gpio = Gpio { direction: 0, data: RTC_CS, ..Gpio::default() };
        let prev = gpio.data;
        gpio.data |= RTC_SCK;
        rtc.clock_edge(&mut gpio, prev);
        assert_eq!(gpio.data & RTC_SIO, RTC_SIO);
    }
}
