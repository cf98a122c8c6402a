//! ARM condition-code evaluation (spec §3 "Condition field").

use super::state::{Cpu, FLAG_C, FLAG_N, FLAG_V, FLAG_Z};

pub fn eval(cpu: &Cpu, cond: u32) -> bool {
    let n = cpu.flag(FLAG_N);
    let z = cpu.flag(FLAG_Z);
    let c = cpu.flag(FLAG_C);
    let v = cpu.flag(FLAG_V);

    match cond {
        0x0 => z,              // EQ
        0x1 => !z,             // NE
        0x2 => c,              // CS/HS
        0x3 => !c,             // CC/LO
        0x4 => n,              // MI
        0x5 => !n,             // PL
        0x6 => v,              // VS
        0x7 => !v,             // VC
        0x8 => c && !z,        // HI
        0x9 => !c || z,        // LS
        0xA => n == v,         // GE
        0xB => n != v,         // LT
        0xC => !z && (n == v), // GT
        0xD => z || (n != v),  // LE
        0xE => true,           // AL
        _ => false,            // 0xF reserved (NV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::state::Mode;

    #[test]
    fn eq_checks_zero_flag() {
        let mut cpu = Cpu::new();
        cpu.set_mode(Mode::System);
        cpu.set_flags(FLAG_Z);
        assert!(eval(&cpu, 0x0));
        cpu.set_flags(0);
        assert!(!eval(&cpu, 0x0));
    }

    #[test]
    fn ge_checks_n_equals_v() {
        let mut cpu = Cpu::new();
        cpu.set_flags(FLAG_N | FLAG_V);
        assert!(eval(&cpu, 0xA));
        cpu.set_flags(FLAG_N);
        assert!(!eval(&cpu, 0xA));
    }

    #[test]
    fn al_always_true() {
        let cpu = Cpu::new();
        assert!(eval(&cpu, 0xE));
    }
}
