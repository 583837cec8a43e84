//! Integration layer driven by the built-in script assembler

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use snespatch::asar::{SymbolsFormat, WrittenBlock};
use snespatch::{AsarIntegration, PatchError, PatchOptions, SymbolKind};

const MAIN_SCRIPT: &str = r#"
; test patch
lorom

org $008000
main_entry:
  sei
  clc
  xce
  jsr subroutine
  bra main_entry

incsrc "routines.asm"

org $009000
string_patch_test:
  db "HELLO", $00
"#;

const ROUTINES: &str = "subroutine:\n  lda #!brightness\n  sta $2100\n  rts\n";

fn write_scripts(dir: &Path) -> std::path::PathBuf {
    let main = dir.join("main.asm");
    fs::write(&main, MAIN_SCRIPT).unwrap();
    fs::write(dir.join("routines.asm"), ROUTINES).unwrap();
    main
}

fn options() -> PatchOptions {
    PatchOptions::default().with_define("brightness", "$0F")
}

fn integration() -> AsarIntegration {
    let mut asar: AsarIntegration = AsarIntegration::default();
    asar.initialize().unwrap();
    asar
}

#[test]
fn test_patch_rom_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_scripts(dir.path());
    let mut asar = integration();
    let mut rom = vec![0xFFu8; 0x8000];

    let result = asar.patch_rom(&main, &mut rom, &options()).unwrap();
    assert!(result.success, "{:?}", result.errors);
    assert!(result.warnings.is_empty());
    assert_eq!(result.rom_size_before, 0x8000);
    assert_eq!(result.rom_size_after, 0x8000);

    assert_eq!(
        &rom[..14],
        &[
            0x78, 0x18, 0xFB, // sei clc xce
            0x20, 0x08, 0x80, // jsr subroutine
            0x80, 0xF8, // bra main_entry
            0xA9, 0x0F, // lda #$0F
            0x8D, 0x00, 0x21, // sta $2100
            0x60, // rts
        ]
    );
    assert_eq!(&rom[0x1000..0x1006], b"HELLO\0");
    assert_eq!(rom[0x1006], 0xFF);

    assert_eq!(
        result.written_blocks,
        vec![
            WrittenBlock {
                pc_offset: 0,
                snes_offset: 0x00_8000,
                num_bytes: 14,
            },
            WrittenBlock {
                pc_offset: 0x1000,
                snes_offset: 0x00_9000,
                num_bytes: 6,
            },
        ]
    );

    let labels: Vec<(&str, u32)> = result
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Label)
        .map(|s| (s.name.as_str(), s.location))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("main_entry", 0x00_8000),
            ("subroutine", 0x00_8008),
            ("string_patch_test", 0x00_9000),
        ]
    );

    assert_eq!(asar.symbol_value("string_patch_test").unwrap(), 0x00_9000);
    let define = asar.find_symbol("brightness").unwrap();
    assert_eq!(define.kind, SymbolKind::Define);
    assert_eq!(define.value.as_deref(), Some("$0F"));
}

#[test]
fn test_patch_failure_keeps_rom() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.asm");
    fs::write(&path, "org $008000\nmain:\n  lda #$01\n  bogus $10\n").unwrap();

    let mut asar = integration();
    let mut rom = vec![0u8; 0x8000];
    let result = asar.patch_rom(&path, &mut rom, &PatchOptions::default()).unwrap();

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains(":4:3: error[E1002]"), "{}", result.errors[0]);
    assert!(result.symbols.is_empty());
    assert_eq!(rom, vec![0u8; 0x8000]);
    assert!(matches!(asar.symbol_value("main"), Err(PatchError::SymbolNotFound(_))));
}

#[test]
fn test_missing_patch_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut asar = integration();
    let mut rom = vec![0u8; 0x8000];

    let result = asar
        .patch_rom(dir.path().join("nope.asm"), &mut rom, &PatchOptions::default())
        .unwrap();
    assert!(!result.success);
    assert!(result.errors[0].contains("could not open"), "{}", result.errors[0]);
}

#[test]
fn test_rom_grows_to_cover_writes() {
    let mut asar = integration();
    let mut rom = vec![0u8; 0x8000];
    let result = asar
        .patch_rom_from_str("org $018000\n  db $AA, $BB\n", ".", &mut rom, &PatchOptions::default())
        .unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.rom_size_after, 0x8002);
    assert_eq!(rom.len(), 0x8002);
    assert_eq!(&rom[0x8000..], &[0xAA, 0xBB]);
}

#[test]
fn test_include_paths_are_searched() {
    let dir = tempfile::tempdir().unwrap();
    let lib_dir = dir.path().join("lib");
    fs::create_dir(&lib_dir).unwrap();
    fs::write(lib_dir.join("gfx.bin"), [1u8, 2, 3, 4]).unwrap();

    let mut asar = integration();
    let mut rom = vec![0u8; 0x8000];
    let options = PatchOptions::default().with_include_path(&lib_dir);
    let result = asar
        .patch_rom_from_str("org $008100\nincbin \"gfx.bin\"\n", dir.path(), &mut rom, &options)
        .unwrap();

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(&rom[0x100..0x104], &[1, 2, 3, 4]);
}

#[test]
fn test_extract_symbols_and_symbol_files() {
    let dir = tempfile::tempdir().unwrap();
    let main = write_scripts(dir.path());
    let mut asar = integration();

    let symbols = asar.extract_symbols(&main, &options()).unwrap();
    assert!(symbols.iter().any(|s| s.name == "main_entry" && s.location == 0x00_8000));
    assert!(symbols.iter().any(|s| s.name == "brightness" && s.kind == SymbolKind::Define));

    assert_eq!(
        asar.symbols_file(SymbolsFormat::Wla).unwrap(),
        "[labels]\n00:8000 main_entry\n00:8008 subroutine\n00:9000 string_patch_test\n"
    );
    assert_eq!(asar.symbols_at_address(0x00_8008)[0].name, "subroutine");

    let broken = dir.path().join("broken.asm");
    fs::write(&broken, "lda (\n").unwrap();
    let err = asar.extract_symbols(&broken, &PatchOptions::default()).unwrap_err();
    assert!(matches!(err, PatchError::Assembler { .. }));
}

#[test]
fn test_lifecycle() {
    let mut asar: AsarIntegration = AsarIntegration::default();
    assert!(!asar.is_initialized());
    let mut rom = vec![0u8; 16];
    assert!(matches!(
        asar.patch_rom("main.asm", &mut rom, &PatchOptions::default()),
        Err(PatchError::NotInitialized)
    ));

    asar.initialize().unwrap();
    asar.initialize().unwrap();
    assert!(asar.is_initialized());
    assert_eq!(asar.version(), "1.9.1");
    assert_eq!(asar.api_version(), "3.3");
}
