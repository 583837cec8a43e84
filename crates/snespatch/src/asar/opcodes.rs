//! 65816 instruction definitions

use std::fmt;
use std::sync::OnceLock;

/// 65816 addressing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    /// `#imm`, one or two bytes depending on the register width
    Immediate,
    /// `#imm`, always one byte (REP, SEP, COP, BRK, WDM)
    Immediate8,
    DirectPage,
    DirectPageX,
    DirectPageY,
    /// `(dp)`
    DirectIndirect,
    /// `[dp]`
    DirectIndirectLong,
    /// `(dp,x)`
    DirectIndexedIndirect,
    /// `(dp),y`
    DirectIndirectIndexed,
    /// `[dp],y`
    DirectIndirectLongIndexed,
    /// `sr,s`
    StackRelative,
    /// `(sr,s),y`
    StackRelativeIndirectIndexed,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    AbsoluteLong,
    AbsoluteLongX,
    /// `(abs)`
    AbsoluteIndirect,
    /// `[abs]`
    AbsoluteIndirectLong,
    /// `(abs,x)`
    AbsoluteIndexedIndirect,
    Relative8,
    Relative16,
    /// `src,dst` bank pair of MVN/MVP
    BlockMove,
}

impl AddressingMode {
    /// Operand bytes following the opcode, `None` for variable-width immediates
    pub fn operand_len(self) -> Option<usize> {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => Some(0),
            Immediate => None,
            Immediate8 | DirectPage | DirectPageX | DirectPageY | DirectIndirect
            | DirectIndirectLong | DirectIndexedIndirect | DirectIndirectIndexed
            | DirectIndirectLongIndexed | StackRelative | StackRelativeIndirectIndexed
            | Relative8 => Some(1),
            Absolute | AbsoluteX | AbsoluteY | AbsoluteIndirect | AbsoluteIndirectLong
            | AbsoluteIndexedIndirect | Relative16 | BlockMove => Some(2),
            AbsoluteLong | AbsoluteLongX => Some(3),
        }
    }

    /// Same operand shape one address width up (dp -> abs -> long)
    pub fn widened(self) -> Option<Self> {
        use AddressingMode::*;
        match self {
            DirectPage => Some(Absolute),
            Absolute => Some(AbsoluteLong),
            DirectPageX => Some(AbsoluteX),
            AbsoluteX => Some(AbsoluteLongX),
            DirectPageY => Some(AbsoluteY),
            DirectIndirect => Some(AbsoluteIndirect),
            DirectIndirectLong => Some(AbsoluteIndirectLong),
            DirectIndexedIndirect => Some(AbsoluteIndexedIndirect),
            _ => None,
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddressingMode::*;
        let text = match self {
            Implied => "implied",
            Accumulator => "A",
            Immediate | Immediate8 => "#imm",
            DirectPage => "dp",
            DirectPageX => "dp,x",
            DirectPageY => "dp,y",
            DirectIndirect => "(dp)",
            DirectIndirectLong => "[dp]",
            DirectIndexedIndirect => "(dp,x)",
            DirectIndirectIndexed => "(dp),y",
            DirectIndirectLongIndexed => "[dp],y",
            StackRelative => "sr,s",
            StackRelativeIndirectIndexed => "(sr,s),y",
            Absolute => "abs",
            AbsoluteX => "abs,x",
            AbsoluteY => "abs,y",
            AbsoluteLong => "long",
            AbsoluteLongX => "long,x",
            AbsoluteIndirect => "(abs)",
            AbsoluteIndirectLong => "[abs]",
            AbsoluteIndexedIndirect => "(abs,x)",
            Relative8 => "rel8",
            Relative16 => "rel16",
            BlockMove => "src,dst",
        };
        f.write_str(text)
    }
}

/// One mnemonic/addressing-mode pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub opcode: u8,
    pub description: &'static str,
}

impl OpcodeInfo {
    /// Encoded size in bytes, with an 8-bit immediate for variable-width forms
    pub fn size(&self) -> usize {
        1 + self.mode.operand_len().unwrap_or(1)
    }
}

// Opcode offsets shared by ORA, AND, EOR, ADC, STA, LDA, CMP, SBC
const GROUP_ONE_MODES: [(AddressingMode, u8); 15] = [
    (AddressingMode::DirectIndexedIndirect, 0x01),
    (AddressingMode::StackRelative, 0x03),
    (AddressingMode::DirectPage, 0x05),
    (AddressingMode::DirectIndirectLong, 0x07),
    (AddressingMode::Immediate, 0x09),
    (AddressingMode::Absolute, 0x0D),
    (AddressingMode::AbsoluteLong, 0x0F),
    (AddressingMode::DirectIndirectIndexed, 0x11),
    (AddressingMode::DirectIndirect, 0x12),
    (AddressingMode::StackRelativeIndirectIndexed, 0x13),
    (AddressingMode::DirectPageX, 0x15),
    (AddressingMode::DirectIndirectLongIndexed, 0x17),
    (AddressingMode::AbsoluteY, 0x19),
    (AddressingMode::AbsoluteX, 0x1D),
    (AddressingMode::AbsoluteLongX, 0x1F),
];

const GROUP_ONE: [(&str, u8, &str); 8] = [
    ("ORA", 0x00, "OR accumulator with memory"),
    ("AND", 0x20, "AND accumulator with memory"),
    ("EOR", 0x40, "exclusive-OR accumulator with memory"),
    ("ADC", 0x60, "add with carry"),
    ("STA", 0x80, "store accumulator"),
    ("LDA", 0xA0, "load accumulator"),
    ("CMP", 0xC0, "compare accumulator with memory"),
    ("SBC", 0xE0, "subtract with borrow"),
];

const OTHERS: &[(&str, AddressingMode, u8, &str)] = {
    use AddressingMode::*;
    &[
        ("LDX", Immediate, 0xA2, "load X"),
        ("LDX", DirectPage, 0xA6, "load X"),
        ("LDX", DirectPageY, 0xB6, "load X"),
        ("LDX", Absolute, 0xAE, "load X"),
        ("LDX", AbsoluteY, 0xBE, "load X"),
        ("LDY", Immediate, 0xA0, "load Y"),
        ("LDY", DirectPage, 0xA4, "load Y"),
        ("LDY", DirectPageX, 0xB4, "load Y"),
        ("LDY", Absolute, 0xAC, "load Y"),
        ("LDY", AbsoluteX, 0xBC, "load Y"),
        ("STX", DirectPage, 0x86, "store X"),
        ("STX", DirectPageY, 0x96, "store X"),
        ("STX", Absolute, 0x8E, "store X"),
        ("STY", DirectPage, 0x84, "store Y"),
        ("STY", DirectPageX, 0x94, "store Y"),
        ("STY", Absolute, 0x8C, "store Y"),
        ("STZ", DirectPage, 0x64, "store zero"),
        ("STZ", DirectPageX, 0x74, "store zero"),
        ("STZ", Absolute, 0x9C, "store zero"),
        ("STZ", AbsoluteX, 0x9E, "store zero"),
        ("CPX", Immediate, 0xE0, "compare X with memory"),
        ("CPX", DirectPage, 0xE4, "compare X with memory"),
        ("CPX", Absolute, 0xEC, "compare X with memory"),
        ("CPY", Immediate, 0xC0, "compare Y with memory"),
        ("CPY", DirectPage, 0xC4, "compare Y with memory"),
        ("CPY", Absolute, 0xCC, "compare Y with memory"),
        ("BIT", Immediate, 0x89, "test bits"),
        ("BIT", DirectPage, 0x24, "test bits"),
        ("BIT", DirectPageX, 0x34, "test bits"),
        ("BIT", Absolute, 0x2C, "test bits"),
        ("BIT", AbsoluteX, 0x3C, "test bits"),
        ("INC", Accumulator, 0x1A, "increment"),
        ("INC", DirectPage, 0xE6, "increment"),
        ("INC", DirectPageX, 0xF6, "increment"),
        ("INC", Absolute, 0xEE, "increment"),
        ("INC", AbsoluteX, 0xFE, "increment"),
        ("DEC", Accumulator, 0x3A, "decrement"),
        ("DEC", DirectPage, 0xC6, "decrement"),
        ("DEC", DirectPageX, 0xD6, "decrement"),
        ("DEC", Absolute, 0xCE, "decrement"),
        ("DEC", AbsoluteX, 0xDE, "decrement"),
        ("ASL", Accumulator, 0x0A, "arithmetic shift left"),
        ("ASL", DirectPage, 0x06, "arithmetic shift left"),
        ("ASL", DirectPageX, 0x16, "arithmetic shift left"),
        ("ASL", Absolute, 0x0E, "arithmetic shift left"),
        ("ASL", AbsoluteX, 0x1E, "arithmetic shift left"),
        ("LSR", Accumulator, 0x4A, "logical shift right"),
        ("LSR", DirectPage, 0x46, "logical shift right"),
        ("LSR", DirectPageX, 0x56, "logical shift right"),
        ("LSR", Absolute, 0x4E, "logical shift right"),
        ("LSR", AbsoluteX, 0x5E, "logical shift right"),
        ("ROL", Accumulator, 0x2A, "rotate left"),
        ("ROL", DirectPage, 0x26, "rotate left"),
        ("ROL", DirectPageX, 0x36, "rotate left"),
        ("ROL", Absolute, 0x2E, "rotate left"),
        ("ROL", AbsoluteX, 0x3E, "rotate left"),
        ("ROR", Accumulator, 0x6A, "rotate right"),
        ("ROR", DirectPage, 0x66, "rotate right"),
        ("ROR", DirectPageX, 0x76, "rotate right"),
        ("ROR", Absolute, 0x6E, "rotate right"),
        ("ROR", AbsoluteX, 0x7E, "rotate right"),
        ("TSB", DirectPage, 0x04, "test and set bits"),
        ("TSB", Absolute, 0x0C, "test and set bits"),
        ("TRB", DirectPage, 0x14, "test and reset bits"),
        ("TRB", Absolute, 0x1C, "test and reset bits"),
        ("BPL", Relative8, 0x10, "branch if plus"),
        ("BMI", Relative8, 0x30, "branch if minus"),
        ("BVC", Relative8, 0x50, "branch if overflow clear"),
        ("BVS", Relative8, 0x70, "branch if overflow set"),
        ("BRA", Relative8, 0x80, "branch always"),
        ("BCC", Relative8, 0x90, "branch if carry clear"),
        ("BCS", Relative8, 0xB0, "branch if carry set"),
        ("BNE", Relative8, 0xD0, "branch if not equal"),
        ("BEQ", Relative8, 0xF0, "branch if equal"),
        ("BRL", Relative16, 0x82, "branch always long"),
        ("PER", Relative16, 0x62, "push effective relative address"),
        ("JMP", Absolute, 0x4C, "jump"),
        ("JMP", AbsoluteLong, 0x5C, "jump long"),
        ("JMP", AbsoluteIndirect, 0x6C, "jump indirect"),
        ("JMP", AbsoluteIndexedIndirect, 0x7C, "jump indexed indirect"),
        ("JMP", AbsoluteIndirectLong, 0xDC, "jump indirect long"),
        ("JML", AbsoluteLong, 0x5C, "jump long"),
        ("JML", AbsoluteIndirectLong, 0xDC, "jump indirect long"),
        ("JSR", Absolute, 0x20, "jump to subroutine"),
        ("JSR", AbsoluteIndexedIndirect, 0xFC, "jump to subroutine indexed indirect"),
        ("JSR", AbsoluteLong, 0x22, "jump to subroutine long"),
        ("JSL", AbsoluteLong, 0x22, "jump to subroutine long"),
        ("PEA", Absolute, 0xF4, "push effective absolute address"),
        ("PEI", DirectIndirect, 0xD4, "push effective indirect address"),
        ("MVN", BlockMove, 0x54, "block move next"),
        ("MVP", BlockMove, 0x44, "block move previous"),
        ("REP", Immediate8, 0xC2, "reset status bits"),
        ("SEP", Immediate8, 0xE2, "set status bits"),
        ("BRK", Implied, 0x00, "software break"),
        ("BRK", Immediate8, 0x00, "software break"),
        ("COP", Immediate8, 0x02, "coprocessor"),
        ("WDM", Immediate8, 0x42, "reserved"),
        ("CLC", Implied, 0x18, "clear carry"),
        ("SEC", Implied, 0x38, "set carry"),
        ("CLI", Implied, 0x58, "clear interrupt disable"),
        ("SEI", Implied, 0x78, "set interrupt disable"),
        ("CLV", Implied, 0xB8, "clear overflow"),
        ("CLD", Implied, 0xD8, "clear decimal"),
        ("SED", Implied, 0xF8, "set decimal"),
        ("DEX", Implied, 0xCA, "decrement X"),
        ("DEY", Implied, 0x88, "decrement Y"),
        ("INX", Implied, 0xE8, "increment X"),
        ("INY", Implied, 0xC8, "increment Y"),
        ("NOP", Implied, 0xEA, "no operation"),
        ("PHA", Implied, 0x48, "push accumulator"),
        ("PHB", Implied, 0x8B, "push data bank"),
        ("PHD", Implied, 0x0B, "push direct page"),
        ("PHK", Implied, 0x4B, "push program bank"),
        ("PHP", Implied, 0x08, "push status"),
        ("PHX", Implied, 0xDA, "push X"),
        ("PHY", Implied, 0x5A, "push Y"),
        ("PLA", Implied, 0x68, "pull accumulator"),
        ("PLB", Implied, 0xAB, "pull data bank"),
        ("PLD", Implied, 0x2B, "pull direct page"),
        ("PLP", Implied, 0x28, "pull status"),
        ("PLX", Implied, 0xFA, "pull X"),
        ("PLY", Implied, 0x7A, "pull Y"),
        ("RTI", Implied, 0x40, "return from interrupt"),
        ("RTL", Implied, 0x6B, "return from subroutine long"),
        ("RTS", Implied, 0x60, "return from subroutine"),
        ("STP", Implied, 0xDB, "stop the processor"),
        ("WAI", Implied, 0xCB, "wait for interrupt"),
        ("TAX", Implied, 0xAA, "transfer A to X"),
        ("TAY", Implied, 0xA8, "transfer A to Y"),
        ("TCD", Implied, 0x5B, "transfer A to direct page"),
        ("TCS", Implied, 0x1B, "transfer A to stack pointer"),
        ("TDC", Implied, 0x7B, "transfer direct page to A"),
        ("TSC", Implied, 0x3B, "transfer stack pointer to A"),
        ("TSX", Implied, 0xBA, "transfer stack pointer to X"),
        ("TXA", Implied, 0x8A, "transfer X to A"),
        ("TXS", Implied, 0x9A, "transfer X to stack pointer"),
        ("TXY", Implied, 0x9B, "transfer X to Y"),
        ("TYA", Implied, 0x98, "transfer Y to A"),
        ("TYX", Implied, 0xBB, "transfer Y to X"),
        ("XBA", Implied, 0xEB, "exchange B and A"),
        ("XCE", Implied, 0xFB, "exchange carry and emulation"),
    ]
};

/// The full 65816 instruction table
pub fn opcodes() -> &'static [OpcodeInfo] {
    static TABLE: OnceLock<Vec<OpcodeInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Vec::with_capacity(GROUP_ONE.len() * GROUP_ONE_MODES.len() + OTHERS.len());
        for (mnemonic, base, description) in GROUP_ONE {
            for (mode, offset) in GROUP_ONE_MODES {
                // STA #imm would be opcode 0x89, which is BIT #imm
                if mnemonic == "STA" && mode == AddressingMode::Immediate {
                    continue;
                }
                table.push(OpcodeInfo {
                    mnemonic,
                    mode,
                    opcode: base | offset,
                    description,
                });
            }
        }
        table.extend(OTHERS.iter().map(|&(mnemonic, mode, opcode, description)| OpcodeInfo {
            mnemonic,
            mode,
            opcode,
            description,
        }));
        table
    })
}

/// Find the encoding of `mnemonic` in `mode` (case-insensitive)
pub fn lookup(mnemonic: &str, mode: AddressingMode) -> Option<&'static OpcodeInfo> {
    opcodes()
        .iter()
        .find(|info| info.mode == mode && info.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Whether any addressing mode exists for `mnemonic`
pub fn is_mnemonic(mnemonic: &str) -> bool {
    opcodes()
        .iter()
        .any(|info| info.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// All modes available for `mnemonic`
pub fn modes_for(mnemonic: &str) -> impl Iterator<Item = AddressingMode> + '_ {
    opcodes()
        .iter()
        .filter(move |info| info.mnemonic.eq_ignore_ascii_case(mnemonic))
        .map(|info| info.mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_group_one_encodings() {
        assert_eq!(lookup("lda", AddressingMode::Immediate).unwrap().opcode, 0xA9);
        assert_eq!(lookup("LDA", AddressingMode::AbsoluteLongX).unwrap().opcode, 0xBF);
        assert_eq!(lookup("sta", AddressingMode::Absolute).unwrap().opcode, 0x8D);
        assert_eq!(lookup("adc", AddressingMode::StackRelative).unwrap().opcode, 0x63);
        assert_eq!(lookup("ora", AddressingMode::DirectIndexedIndirect).unwrap().opcode, 0x01);
        assert_eq!(lookup("sbc", AddressingMode::DirectIndirectLongIndexed).unwrap().opcode, 0xF7);
        assert!(lookup("sta", AddressingMode::Immediate).is_none());
    }

    #[test]
    fn test_misc_encodings() {
        assert_eq!(lookup("jsl", AddressingMode::AbsoluteLong).unwrap().opcode, 0x22);
        assert_eq!(lookup("rtl", AddressingMode::Implied).unwrap().opcode, 0x6B);
        assert_eq!(lookup("rep", AddressingMode::Immediate8).unwrap().opcode, 0xC2);
        assert_eq!(lookup("brl", AddressingMode::Relative16).unwrap().opcode, 0x82);
        assert_eq!(lookup("mvn", AddressingMode::BlockMove).unwrap().opcode, 0x54);
        assert_eq!(lookup("inc", AddressingMode::Accumulator).unwrap().opcode, 0x1A);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(lookup("nop", AddressingMode::Implied).unwrap().size(), 1);
        assert_eq!(lookup("lda", AddressingMode::DirectPage).unwrap().size(), 2);
        assert_eq!(lookup("jsr", AddressingMode::Absolute).unwrap().size(), 3);
        assert_eq!(lookup("jsl", AddressingMode::AbsoluteLong).unwrap().size(), 4);
        assert_eq!(lookup("mvp", AddressingMode::BlockMove).unwrap().size(), 3);
    }

    #[test]
    fn test_opcode_bytes_are_unique_per_instruction() {
        // JML/JMP long, JSL/JSR long and the two BRK forms share bytes
        let aliases = [0x00u8, 0x22, 0x5C, 0xDC];
        let mut seen = HashSet::new();
        for info in opcodes() {
            if aliases.contains(&info.opcode) {
                continue;
            }
            assert!(seen.insert(info.opcode), "duplicate opcode {:#04X}", info.opcode);
        }
        assert_eq!(seen.len(), 252);
    }

    #[test]
    fn test_widening() {
        assert_eq!(AddressingMode::DirectPage.widened(), Some(AddressingMode::Absolute));
        assert_eq!(AddressingMode::Absolute.widened(), Some(AddressingMode::AbsoluteLong));
        assert_eq!(AddressingMode::AbsoluteY.widened(), None);
        assert!(is_mnemonic("xba"));
        assert!(!is_mnemonic("mov"));
        assert!(modes_for("stz").count() == 4);
    }
}
