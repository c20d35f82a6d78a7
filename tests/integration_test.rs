/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! End-to-end scenarios, one per testable property of the assembler's
//! pipeline: each one assembles a small translation unit through a
//! `MockFileReader` and inspects the diagnostics and/or the resulting ROM
//! image, rather than poking at any one subsystem in isolation.

use std::path::Path;

use rasm::assemble;
use rasm::config::AssembleOptions;
use rasm::errors::AssemblyError;
use rasm::file_reader::MockFileReader;

fn assemble_source(source: &str) -> rasm::AssembleOutput {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", source);
    assemble(Path::new("test.asm"), &AssembleOptions::default(), &reader).unwrap()
}

fn assert_no_errors(output: &rasm::AssembleOutput) {
    let errors: Vec<_> = output.diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn forward_reference_resolves_jmp_absolute() {
    // Forward reference: `jmp target` then `target:` — no errors, the
    // label lands at address 3 (1-byte opcode + 2-byte absolute operand),
    // and the operand encodes that same address.
    let output = assemble_source(".target mos6502\njmp target\ntarget:\nnop\n");
    assert_no_errors(&output);
    let rom = output.rom.expect("no errors should mean a ROM was built");
    assert_eq!(&rom[0..3], &[0x4C, 0x03, 0x00]);
    assert_eq!(rom[3], 0xEA); // nop at the resolved target address
}

#[test]
fn immediate_size_widens_under_65816_m_flag() {
    // After `rep #$20` clears the `m` flag, `lda
    // #$1234` is a 3-byte instruction (1 opcode + 2-byte operand).
    let output = assemble_source(".target wdc65816\nrep #$20\nlda #$1234\nafter:\n.dw after\n");
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    // rep #$20 (2 bytes) + lda #$1234 (3 bytes) = address 5 for `after`.
    assert_eq!(&rom[5..7], &[0x05, 0x00]);
}

#[test]
fn mvn_block_move_encodes_both_bank_operands() {
    // `mvn srcbank, destbank` is a 3-byte instruction: opcode, destination
    // bank, source bank — both operands must survive the collapse to the
    // single-value addressing shape every other instruction fits.
    let output = assemble_source(".target wdc65816\nmvn $7e, $7f\nnop\n");
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    assert_eq!(&rom[0..3], &[0x54, 0x7f, 0x7e]);
    assert_eq!(rom[3], 0xEA);
}

#[test]
fn anonymous_backward_branch_resolves_to_its_label() {
    // `-` labels $8000, `dex` occupies $8000-$8001,
    // so `bne -` at $8001 branches back to $8000 — an offset of
    // $8000 - ($8001 + 2) = -3.
    let output = assemble_source(".target mos6502\n.org $8000\n-\ndex\nbne -\n");
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    assert_eq!(rom[0], 0xCA);
    assert_eq!(&rom[1..3], &[0xD0, 0xFD]);
}

#[test]
fn assert_on_address_passes_and_fails() {
    // `.assert` passes silently and fails loudly with its message.
    let ok = assemble_source(".target mos6502\n.org $8000\nnop\nnop\nnop\n.assert * == $8003, \"off\"\n");
    assert_no_errors(&ok);

    let bad = assemble_source(".target mos6502\n.org $8000\nnop\nnop\nnop\n.assert * == $8004, \"off\"\n");
    assert!(bad.rom.is_none());
    let found = bad
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::AssertionFailed { message } if message == "off"));
    assert!(found, "expected a failed-assertion diagnostic with message 'off'");
}

#[test]
fn macro_expansion_is_hygienic_across_invocations() {
    // Two invocations of the same macro produce two
    // distinct, non-colliding local labels.
    let source = ".target mos6502\n\
                  .macro pair\n\
                  @loop: nop\n\
                  jmp @loop\n\
                  .endmacro\n\
                  pair\n\
                  pair\n";
    let output = assemble_source(source);
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    // pair@loop_0 at 0, jmp @loop_0 -> 0; pair@loop_1 at 3, jmp -> 3.
    assert_eq!(rom[0], 0xEA); // nop
    assert_eq!(&rom[1..3], &[0x4C, 0x00]); // jmp 0x0000 (its own loop label)
    assert_eq!(rom[3], 0xEA);
    assert_eq!(&rom[4..6], &[0x4C, 0x03]); // jmp 0x0003, not the first expansion's label
}

#[test]
fn undefined_symbol_reference_is_reported() {
    // Referencing an undefined symbol is reported, not silently zeroed.
    let output = assemble_source(".target mos6502\njmp nowhere\n");
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::UndefinedSymbol { name } if name == "nowhere"));
    assert!(found, "expected an undefined-symbol diagnostic naming 'nowhere'");
}

#[test]
fn target_redeclared_to_same_architecture_is_idempotent() {
    let output = assemble_source(".target snes\n.target snes\nnop\n");
    assert_no_errors(&output);
}

#[test]
fn target_conflict_across_architectures_is_an_error() {
    let output = assemble_source(".nes\n.snes\nnop\n");
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::ArchitectureConflict { .. }));
    assert!(found, "expected an architecture-conflict diagnostic");
}

#[test]
fn equ_definition_is_visible_to_earlier_pass_two_reference() {
    // equ/= definitions run in pass 1, so a pass-2 expression appearing
    // textually before the `.equ` line in source order still sees it.
    let output = assemble_source(".target mos6502\nlda #SIZE\n.equ SIZE, 5\n");
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    assert_eq!(&rom[0..2], &[0xA9, 0x05]);
}

#[test]
fn duplicate_definition_is_reported_and_keeps_first_value() {
    let output = assemble_source(".target mos6502\nSTART:\nnop\nSTART:\nnop\n");
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::DuplicateDefinition { .. }));
    assert!(found);
}

#[test]
fn include_directive_splices_statements_from_another_file() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "main.asm",
        ".target mos6502\nnop\n.include \"sub.asm\"\nnop\n",
    );
    reader.add_file("sub.asm", "inx\n");

    let output = assemble(
        Path::new("main.asm"),
        &AssembleOptions::default(),
        &reader,
    )
    .unwrap();
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    assert_eq!(rom, vec![0xEA, 0xE8, 0xEA]);
}

#[test]
fn cyclic_include_is_rejected() {
    let mut reader = MockFileReader::default();
    reader.add_file("loop.asm", ".include \"loop.asm\"\n");
    let result = assemble(Path::new("loop.asm"), &AssembleOptions::default(), &reader);
    assert!(result.is_err());
}

#[test]
fn incbin_splices_raw_bytes_at_the_current_address() {
    let mut reader = MockFileReader::default();
    reader.add_file("main.asm", ".target mos6502\nnop\n.incbin \"data.bin\"\n");
    reader.add_binary_file("data.bin", &[1, 2, 3, 4]);

    let output = assemble(
        Path::new("main.asm"),
        &AssembleOptions::default(),
        &reader,
    )
    .unwrap();
    assert_no_errors(&output);
    assert_eq!(output.rom.unwrap(), vec![0xEA, 1, 2, 3, 4]);
}

#[test]
fn repeat_block_executes_body_count_times() {
    let output = assemble_source(".target mos6502\n.repeat 3\nnop\n.endr\n");
    assert_no_errors(&output);
    assert_eq!(output.rom.unwrap(), vec![0xEA, 0xEA, 0xEA]);
}

#[test]
fn conditional_selects_the_first_truthy_branch() {
    let output = assemble_source(
        ".target mos6502\n\
         .define FLAG, 0\n\
         .if FLAG == 1\n\
         nop\n\
         .elseif FLAG == 0\n\
         inx\n\
         .else\n\
         dex\n\
         .endif\n",
    );
    assert_no_errors(&output);
    assert_eq!(output.rom.unwrap(), vec![0xE8]);
}

#[test]
fn macro_arity_error_on_too_few_arguments() {
    let output = assemble_source(
        ".target mos6502\n\
         .macro add_const, value, extra\n\
         lda #value\n\
         .endmacro\n\
         add_const\n",
    );
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::MacroArity { .. }));
    assert!(found);
}

#[test]
fn macro_default_argument_is_used_when_omitted() {
    let output = assemble_source(
        ".target mos6502\n\
         .macro loadit, value = 5\n\
         lda #value\n\
         .endmacro\n\
         loadit\n",
    );
    assert_no_errors(&output);
    assert_eq!(output.rom.unwrap(), vec![0xA9, 0x05]);
}

#[test]
fn macro_name_colliding_with_a_mnemonic_is_a_reserved_word_error() {
    let output = assemble_source(".target mos6502\n.macro nop\nnop\n.endmacro\n");
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::ReservedWord { .. }));
    assert!(found);
}

#[test]
fn db_accepts_string_literals_one_byte_per_character() {
    let output = assemble_source(".target mos6502\n.db \"AB\", 1\n");
    assert_no_errors(&output);
    assert_eq!(output.rom.unwrap(), vec![b'A', b'B', 1]);
}

#[test]
fn res_reserves_space_without_emitting_bytes() {
    let output = assemble_source(".target mos6502\nnop\n.res 2\nnop\n");
    assert_no_errors(&output);
    // `.res` advances the address but emits nothing; the gap is padded by
    // the ROM builder rather than written by the analyzer itself.
    assert_eq!(output.rom.unwrap(), vec![0xEA, 0x00, 0x00, 0xEA]);
}

#[test]
fn nes_rom_carries_the_ines_magic_header() {
    let output = assemble_source(".nes\nnop\n");
    assert_no_errors(&output);
    let rom = output.rom.unwrap();
    assert_eq!(&rom[0..4], b"NES\x1a");
}

#[test]
fn division_by_zero_in_org_is_a_directive_misuse_error() {
    let output = assemble_source(".target mos6502\n.org 1 / 0\nnop\n");
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::DirectiveMisuse { .. }));
    assert!(found);
}

#[test]
fn branch_out_of_range_is_reported() {
    let mut source = String::from(".target mos6502\n.org $8000\nbne far\n");
    for _ in 0..200 {
        source.push_str("nop\n");
    }
    source.push_str("far:\n");
    let output = assemble_source(&source);
    assert!(output.rom.is_none());
    let found = output
        .diagnostics
        .iter()
        .any(|d| matches!(&d.error, AssemblyError::BranchOutOfRange { .. }));
    assert!(found);
}
