//! Two-pass assembler for patch scripts
//!
//! Pass one fixes the size of every statement and the address of every
//! label; pass two evaluates operands and writes bytes into the ROM.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, trace};

use super::error::{Located, Location, ScriptError, ScriptErrorKind, ScriptResult};
use super::expr::Expr;
use super::mapper::Mapper;
use super::parser::{parse_line, DataItem, Instruction, Operand, Shape, Statement};
use super::preprocessor::{resolve_path, Preprocessed};
use crate::asar::library::{LabelData, WrittenBlock};
use crate::asar::opcodes::{self, AddressingMode, OpcodeInfo};
use crate::common::Span;

/// Default origin when a script writes before any `org`
const DEFAULT_ORIGIN: u32 = 0x00_8000;

/// Everything one assembly run produced
#[derive(Debug, Default)]
pub struct AssemblyOutput {
    pub success: bool,
    pub labels: Vec<LabelData>,
    pub written_blocks: Vec<WrittenBlock>,
    pub errors: Vec<Located>,
    pub warnings: Vec<Located>,
}

struct Unit {
    statement: Statement,
    location: Location,
}

/// Opcode and operand size picked for an instruction
#[derive(Debug, Clone, Copy)]
struct Encoding {
    info: &'static OpcodeInfo,
    operand_len: usize,
}

impl Encoding {
    fn new(info: &'static OpcodeInfo, operand_len: usize) -> Self {
        Self { info, operand_len }
    }

    fn size(&self) -> usize {
        1 + self.operand_len
    }
}

/// Pass one result for a statement
#[derive(Debug)]
enum Layout {
    Empty,
    Instruction(Encoding),
    Data(usize),
    Binary(Vec<u8>),
}

/// Current output address
#[derive(Debug, Clone, Copy)]
struct Cursor {
    pc: u32,
    mapper: Mapper,
}

impl Cursor {
    fn new() -> Self {
        Self {
            pc: DEFAULT_ORIGIN,
            mapper: Mapper::default(),
        }
    }

    fn advance(&mut self, len: usize) {
        self.pc = self.mapper.advance(self.pc, len);
    }
}

/// Destination for pass two writes
struct RomWriter<'r> {
    rom: &'r mut [u8],
    rom_len: usize,
    blocks: Vec<WrittenBlock>,
}

impl RomWriter<'_> {
    fn write(&mut self, cursor: Cursor, bytes: &[u8]) -> ScriptResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let Some(offset) = cursor.mapper.snes_to_pc(cursor.pc) else {
            return Err(ScriptError::address(
                format!("address ${:06X} is not ROM in {} mapping", cursor.pc, cursor.mapper),
                Span::default(),
            ));
        };

        let end = offset + bytes.len();
        if end > self.rom.len() {
            return Err(ScriptError::address(
                format!(
                    "write at ${:06X} ends past the maximum ROM size of {:#X} bytes",
                    cursor.pc,
                    self.rom.len()
                ),
                Span::default(),
            ));
        }

        self.rom[offset..end].copy_from_slice(bytes);
        self.rom_len = self.rom_len.max(end);

        match self.blocks.last_mut() {
            Some(last) if last.end() == offset => last.num_bytes += bytes.len(),
            _ => self.blocks.push(WrittenBlock {
                pc_offset: offset,
                snes_offset: cursor.pc,
                num_bytes: bytes.len(),
            }),
        }
        Ok(())
    }
}

pub struct Assembler<'a> {
    include_paths: &'a [PathBuf],
    symbols: HashMap<String, u32>,
    label_order: Vec<String>,
}

impl<'a> Assembler<'a> {
    pub fn new(include_paths: &'a [PathBuf]) -> Self {
        Self {
            include_paths,
            symbols: HashMap::new(),
            label_order: Vec::new(),
        }
    }

    /// Assemble preprocessed source into `rom`
    ///
    /// `rom_len` is only updated when assembly succeeds.
    pub fn assemble(&mut self, source: &Preprocessed, rom: &mut [u8], rom_len: &mut usize) -> AssemblyOutput {
        let mut output = AssemblyOutput {
            errors: source.errors.clone(),
            ..AssemblyOutput::default()
        };

        let mut units = Vec::new();
        for line in &source.lines {
            match parse_line(&line.text) {
                Ok(statements) => units.extend(statements.into_iter().map(|statement| Unit {
                    statement,
                    location: line.location,
                })),
                Err(err) => output.errors.push(err.locate(line.location)),
            }
        }
        if !output.errors.is_empty() {
            return output;
        }

        // Pass 1: sizes and label addresses
        let layouts = self.layout_pass(&units, source, &mut output.errors);
        if !output.errors.is_empty() {
            return output;
        }
        debug!(statements = units.len(), labels = self.symbols.len(), "layout pass complete");

        // Pass 2: emit bytes
        let mut writer = RomWriter {
            rom,
            rom_len: *rom_len,
            blocks: Vec::new(),
        };
        self.encode_pass(&units, &layouts, &mut writer, &mut output);

        output.labels = self
            .label_order
            .iter()
            .filter_map(|name| {
                self.symbols.get(name).map(|&location| LabelData {
                    name: name.clone(),
                    location,
                })
            })
            .collect();

        output.success = output.errors.is_empty();
        if output.success {
            *rom_len = writer.rom_len;
            output.written_blocks = writer.blocks;
        }
        output
    }

    fn define_label(&mut self, name: &str, value: u32, span: Span) -> ScriptResult<()> {
        if self.symbols.contains_key(name) {
            return Err(ScriptError::symbol(format!("label '{name}' redefined"), span));
        }
        self.symbols.insert(name.to_string(), value);
        self.label_order.push(name.to_string());
        Ok(())
    }

    fn layout_pass(&mut self, units: &[Unit], source: &Preprocessed, errors: &mut Vec<Located>) -> Vec<Layout> {
        self.symbols.clear();
        self.label_order.clear();

        let mut cursor = Cursor::new();
        let mut layouts = Vec::with_capacity(units.len());

        for unit in units {
            let layout = match self.layout_statement(unit, source, &mut cursor) {
                Ok(layout) => layout,
                Err(err) => {
                    errors.push(err.locate(unit.location));
                    Layout::Empty
                }
            };
            layouts.push(layout);
        }

        layouts
    }

    fn layout_statement(&mut self, unit: &Unit, source: &Preprocessed, cursor: &mut Cursor) -> ScriptResult<Layout> {
        match &unit.statement {
            Statement::Label { name, span } => {
                self.define_label(name, cursor.pc, *span)?;
                Ok(Layout::Empty)
            }
            Statement::Assign { name, value, span } => {
                let value = value.eval(&self.symbols)?;
                self.define_label(name, (value as u32) & 0xFF_FFFF, *span)?;
                Ok(Layout::Empty)
            }
            Statement::Org(expr) => {
                cursor.pc = (expr.eval(&self.symbols)? as u32) & 0xFF_FFFF;
                Ok(Layout::Empty)
            }
            Statement::Mapper(mapper) => {
                cursor.mapper = *mapper;
                Ok(Layout::Empty)
            }
            Statement::Data { width, items } => {
                let size = items
                    .iter()
                    .map(|item| match item {
                        DataItem::Expr(_) => usize::from(*width),
                        DataItem::Text { text, .. } => text.len() * usize::from(*width),
                    })
                    .sum();
                cursor.advance(size);
                Ok(Layout::Data(size))
            }
            Statement::Incbin { path, span } => {
                let dir = source.dir_of(unit.location.file_id);
                let Some(resolved) = resolve_path(path, dir, self.include_paths) else {
                    return Err(ScriptError::new(
                        ScriptErrorKind::Include,
                        format!("file '{path}' not found"),
                        *span,
                    ));
                };
                let data = fs::read(&resolved).map_err(|err| {
                    ScriptError::new(
                        ScriptErrorKind::Include,
                        format!("could not read '{}': {err}", resolved.display()),
                        *span,
                    )
                })?;
                cursor.advance(data.len());
                Ok(Layout::Binary(data))
            }
            Statement::Warn { .. } | Statement::Error { .. } => Ok(Layout::Empty),
            Statement::Instruction(inst) => {
                let encoding = select_encoding(inst)?;
                cursor.advance(encoding.size());
                Ok(Layout::Instruction(encoding))
            }
        }
    }

    fn encode_pass(&self, units: &[Unit], layouts: &[Layout], writer: &mut RomWriter<'_>, output: &mut AssemblyOutput) {
        let mut cursor = Cursor::new();

        for (unit, layout) in units.iter().zip(layouts) {
            let start = cursor;
            let result = match (&unit.statement, layout) {
                (Statement::Org(expr), _) => expr.eval(&self.symbols).map(|value| {
                    cursor.pc = (value as u32) & 0xFF_FFFF;
                }),
                (Statement::Mapper(mapper), _) => {
                    cursor.mapper = *mapper;
                    Ok(())
                }
                (Statement::Warn { message, span }, _) => {
                    output.warnings.push(
                        ScriptError::new(ScriptErrorKind::User, message.clone(), *span).locate(unit.location),
                    );
                    Ok(())
                }
                (Statement::Error { message, span }, _) => {
                    Err(ScriptError::new(ScriptErrorKind::User, message.clone(), *span))
                }
                (Statement::Data { width, items }, Layout::Data(size)) => {
                    cursor.advance(*size);
                    self.encode_data(*width, items).and_then(|bytes| writer.write(start, &bytes))
                }
                (Statement::Incbin { .. }, Layout::Binary(data)) => {
                    cursor.advance(data.len());
                    writer.write(start, data)
                }
                (Statement::Instruction(inst), Layout::Instruction(encoding)) => {
                    cursor.advance(encoding.size());
                    self.encode_instruction(inst, *encoding, start.pc)
                        .and_then(|bytes| writer.write(start, &bytes).map_err(|err| with_span(err, inst.span)))
                }
                _ => Ok(()),
            };

            if let Err(err) = result {
                output.errors.push(err.locate(unit.location));
            }
        }

        trace!(blocks = writer.blocks.len(), rom_len = writer.rom_len, "encode pass complete");
    }

    fn encode_data(&self, width: u8, items: &[DataItem]) -> ScriptResult<Vec<u8>> {
        let mut bytes = Vec::new();
        for item in items {
            match item {
                DataItem::Expr(expr) => {
                    let value = expr.eval(&self.symbols)?;
                    push_le(&mut bytes, checked_value(value, width, expr)?, width);
                }
                DataItem::Text { text, .. } => {
                    for &b in text.as_bytes() {
                        push_le(&mut bytes, u32::from(b), width);
                    }
                }
            }
        }
        Ok(bytes)
    }

    fn encode_instruction(&self, inst: &Instruction, encoding: Encoding, pc: u32) -> ScriptResult<Vec<u8>> {
        let mut bytes = vec![encoding.info.opcode];
        let width = encoding.operand_len as u8;

        match &inst.operand {
            Operand::None | Operand::Accumulator => {}
            Operand::Immediate(expr) => {
                let value = expr.eval(&self.symbols)?;
                push_le(&mut bytes, checked_value(value, width, expr)?, width);
            }
            Operand::BlockMove { src, dst } => {
                // Operands are written destination first
                bytes.push(bank_byte(dst.eval(&self.symbols)?));
                bytes.push(bank_byte(src.eval(&self.symbols)?));
            }
            Operand::Address { expr, .. } => {
                let target = expr.eval(&self.symbols)?;
                match encoding.info.mode {
                    AddressingMode::Relative8 | AddressingMode::Relative16 => {
                        let next = i64::from(pc) + 1 + i64::from(width);
                        let offset = target - next;
                        let limit = 1i64 << (8 * u32::from(width) - 1);
                        if offset < -limit || offset >= limit {
                            return Err(ScriptError::range(
                                format!("branch to ${target:06X} out of range ({offset} bytes)"),
                                expr.span,
                            ));
                        }
                        push_le(&mut bytes, offset as u32, width);
                    }
                    _ => push_le(&mut bytes, target as u32, width),
                }
            }
        }

        Ok(bytes)
    }
}

fn with_span(mut err: ScriptError, span: Span) -> ScriptError {
    if err.span == Span::default() {
        err.span = span;
    }
    err
}

fn push_le(out: &mut Vec<u8>, value: u32, width: u8) {
    out.extend_from_slice(&value.to_le_bytes()[..usize::from(width)]);
}

fn bank_byte(value: i64) -> u8 {
    if (0..=0xFF).contains(&value) {
        value as u8
    } else {
        (value >> 16) as u8
    }
}

/// Reject values that do not fit in `width` bytes, signed or unsigned
fn checked_value(value: i64, width: u8, expr: &Expr) -> ScriptResult<u32> {
    if width >= 4 {
        return Ok(value as u32);
    }
    let bits = 8 * u32::from(width);
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    if value < min || value > max {
        return Err(ScriptError::range(
            format!("value {value:#X} does not fit in {width} byte(s)"),
            expr.span,
        ));
    }
    Ok(value as u32)
}

/// Pick the opcode and operand size for an instruction from its syntax
fn select_encoding(inst: &Instruction) -> ScriptResult<Encoding> {
    let mnemonic = inst.mnemonic.as_str();
    let find = |mode| opcodes::lookup(mnemonic, mode);
    let invalid = |what: String| {
        ScriptError::mode(
            format!("{} does not support {what}", mnemonic.to_ascii_uppercase()),
            inst.span,
        )
    };

    match &inst.operand {
        Operand::None => find(AddressingMode::Implied)
            .or_else(|| find(AddressingMode::Accumulator))
            .map(|info| Encoding::new(info, 0))
            .ok_or_else(|| invalid("an empty operand".into())),
        Operand::Accumulator => find(AddressingMode::Accumulator)
            .map(|info| Encoding::new(info, 0))
            .ok_or_else(|| invalid("accumulator addressing".into())),
        Operand::BlockMove { .. } => find(AddressingMode::BlockMove)
            .map(|info| Encoding::new(info, 2))
            .ok_or_else(|| invalid("block move operands".into())),
        Operand::Immediate(expr) => {
            if let Some(info) = find(AddressingMode::Immediate8) {
                return match inst.hint {
                    None | Some(1) => Ok(Encoding::new(info, 1)),
                    Some(_) => Err(invalid("a wide immediate".into())),
                };
            }
            let Some(info) = find(AddressingMode::Immediate) else {
                return Err(invalid("immediate addressing".into()));
            };
            match inst.hint.unwrap_or_else(|| expr.natural_width()) {
                width @ (1 | 2) => Ok(Encoding::new(info, usize::from(width))),
                _ => Err(ScriptError::range(
                    "immediate operands are at most 16 bits",
                    expr.span,
                )),
            }
        }
        Operand::Address { expr, shape } => {
            if *shape == Shape::Direct {
                let relative = find(AddressingMode::Relative8).or_else(|| find(AddressingMode::Relative16));
                if let Some(info) = relative {
                    return Ok(Encoding::new(info, info.mode.operand_len().unwrap_or(1)));
                }
            }

            let width = inst.hint.unwrap_or_else(|| expr.natural_width().min(3));
            let mut mode = base_mode(*shape, width);
            loop {
                if let Some(info) = find(mode) {
                    return Ok(Encoding::new(info, info.mode.operand_len().unwrap_or(1)));
                }
                match mode.widened() {
                    Some(wider) if inst.hint.is_none() => mode = wider,
                    _ => return Err(invalid(format!("{mode} addressing"))),
                }
            }
        }
    }
}

fn base_mode(shape: Shape, width: u8) -> AddressingMode {
    use AddressingMode::*;
    match (shape, width) {
        (Shape::Direct, 1) => DirectPage,
        (Shape::Direct, 2) => Absolute,
        (Shape::Direct, _) => AbsoluteLong,
        (Shape::IndexedX, 1) => DirectPageX,
        (Shape::IndexedX, 2) => AbsoluteX,
        (Shape::IndexedX, _) => AbsoluteLongX,
        (Shape::IndexedY, 1) => DirectPageY,
        (Shape::IndexedY, _) => AbsoluteY,
        (Shape::Stack, _) => StackRelative,
        (Shape::Indirect, 1) => DirectIndirect,
        (Shape::Indirect, _) => AbsoluteIndirect,
        (Shape::IndexedIndirect, 1) => DirectIndexedIndirect,
        (Shape::IndexedIndirect, _) => AbsoluteIndexedIndirect,
        (Shape::IndirectIndexed, _) => DirectIndirectIndexed,
        (Shape::StackIndirectIndexed, _) => StackRelativeIndirectIndexed,
        (Shape::IndirectLong, 1) => DirectIndirectLong,
        (Shape::IndirectLong, _) => AbsoluteIndirectLong,
        (Shape::IndirectLongIndexed, _) => DirectIndirectLongIndexed,
    }
}
