//! EEPROM serial protocol (spec §3 "Cartridge backup: EEPROM"), driven one
//! bit at a time over the DMA-mapped backup address window. Address width
//! (6 vs 14 bits) is not knowable from the protocol itself — the real
//! hardware infers it from how many bits the game clocks in, which in
//! practice tracks the DMA transfer count used to drive the stream
//! (spec §4.4 "EEPROM width autodetection").

const SIZE_512B: usize = 0x200;
const SIZE_8K: usize = 0x2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    WriteRequest,
    ReadRequest,
    WriteData,
    EndOfStream,
}

pub struct Eeprom {
    data: Vec<u8>,
    width: Option<u32>,
    state: State,
    addr: u32,
    wbits: u64,
    num_wbits: u32,
    rbits: u64,
    num_rbits: u32,
}

impl Eeprom {
    pub fn new() -> Self {
        Self {
            data: vec![0; SIZE_8K],
            width: None,
            state: State::Idle,
            addr: 0,
            wbits: 0,
            num_wbits: 0,
            rbits: 0,
            num_rbits: 0,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    pub fn load_raw(&mut self, data: &[u8]) {
        let n = data.len().min(self.data.len());
        self.data[..n].copy_from_slice(&data[..n]);
    }

    /// Called when a DMA targeting the EEPROM window completes, so the
    /// address width can be inferred from the transfer length: 9 bits of
    /// stream selects a 6-bit (512 B) address, 17 bits selects 14-bit (8K).
    pub fn notice_dma_count(&mut self, count: u32) {
        self.width = match count {
            9 | 73 => Some(6),
            17 | 81 => Some(14),
            _ => self.width,
        };
    }

    pub fn read_bit(&mut self) -> u16 {
        if self.num_rbits > 64 {
            self.num_rbits -= 1;
            return 1;
        }
        if self.num_rbits > 0 {
            self.num_rbits -= 1;
            return ((self.rbits >> self.num_rbits) & 1) as u16;
        }
        1
    }

    pub fn write_bit(&mut self, value: u16) {
        let Some(width) = self.width else { return };
        self.wbits = (self.wbits << 1) | (value as u64 & 1);
        self.num_wbits += 1;

        match self.state {
            State::Idle => {
                if self.num_wbits < 2 {
                    return;
                }
                self.state = match self.wbits {
                    2 => State::WriteRequest,
                    3 => State::ReadRequest,
                    _ => State::Idle,
                };
                self.wbits = 0;
                self.num_wbits = 0;
            }
            State::EndOfStream => {
                self.state = State::Idle;
                self.wbits = 0;
                self.num_wbits = 0;
            }
            State::WriteRequest => {
                if self.num_wbits < width {
                    return;
                }
                self.addr = (self.wbits as u32) * 8;
                self.rbits = 0;
                self.num_rbits = 0;
                self.state = State::WriteData;
                self.wbits = 0;
                self.num_wbits = 0;
            }
            State::ReadRequest => {
                if self.num_wbits < width {
                    return;
                }
                self.addr = (self.wbits as u32) * 8;
                self.rbits = self.read_block(self.addr);
                self.num_rbits = 68;
                self.state = State::EndOfStream;
                self.wbits = 0;
                self.num_wbits = 0;
            }
            State::WriteData => {
                if self.num_wbits < 64 {
                    return;
                }
                self.write_block(self.addr, self.wbits);
                self.state = State::EndOfStream;
                self.wbits = 0;
                self.num_wbits = 0;
            }
        }
    }

    fn read_block(&self, addr: u32) -> u64 {
        let mut bits = 0u64;
        for i in 0..8 {
            let b = self.data[addr as usize + i];
            for j in (0..8).rev() {
                bits = (bits << 1) | ((b >> j) & 1) as u64;
            }
        }
        bits
    }

    fn write_block(&mut self, addr: u32, bits: u64) {
        for i in 0..8 {
            let mut byte = 0u8;
            for j in (0..8).rev() {
                let shift = (7 - i) * 8 + j;
                byte = (byte << 1) | (((bits >> shift) & 1) as u8);
            }
            let idx = addr as usize + i;
            if idx < self.data.len() {
                self.data[idx] = byte;
            }
        }
    }
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bits(e: &mut Eeprom, bits: &[u16]) {
        for &b in bits {
            e.write_bit(b);
        }
    }

    fn bits_of(value: u64, n: u32) -> Vec<u16> {
        (0..n).rev().map(|i| ((value >> i) & 1) as u16).collect()
    }

    #[test]
    fn write_then_read_roundtrip_6bit_address() {
        let mut e = Eeprom::new();
        e.notice_dma_count(9);

        write_bits(&mut e, &bits_of(2, 2));
        write_bits(&mut e, &bits_of(3, 6)); // address 3 -> byte offset 24
        let mut payload = bits_of(0, 64);
        payload[63] = 1; // low bit of the 64-bit data block
        write_bits(&mut e, &payload);
        e.write_bit(0); // end-of-stream bit

        write_bits(&mut e, &bits_of(3, 2));
        write_bits(&mut e, &bits_of(3, 6));
        e.write_bit(0); // padding bit consumed before the 68-bit reply

        for _ in 0..4 {
            assert_eq!(e.read_bit(), 1); // leading dummy bits
        }
        let mut got = 0u64;
        for _ in 0..64 {
            got = (got << 1) | e.read_bit() as u64;
        }
        assert_eq!(got, 1);
    }
}
