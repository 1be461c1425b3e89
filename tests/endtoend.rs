use std::fs;
use std::io::Write;

use pal8as::*;

const LEADER_LEN: usize = 240;

/// One element of a decoded object stream.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Tape {
    Origin(u16),
    Word(u16),
    FieldChange(u8),
}

/// Strip the leader and trailer, then decode origin pairs, data
/// word pairs and field-change bytes.
fn decode_bin(object: &[u8]) -> Vec<Tape> {
    let mut start = 0;
    while start < object.len() && object[start] == 0o200 {
        start += 1;
    }
    let mut end = object.len();
    while end > start && object[end - 1] == 0o200 {
        end -= 1;
    }
    let payload = &object[start..end];
    let mut out = Vec::new();
    let mut i = 0;
    while i < payload.len() {
        let b = payload[i];
        if b & 0o200 != 0 {
            out.push(Tape::FieldChange(b));
            i += 1;
        } else if b & 0o100 != 0 {
            let lo = payload[i + 1];
            out.push(Tape::Origin((((b & 0o77) as u16) << 6) | lo as u16));
            i += 2;
        } else {
            let lo = payload[i + 1];
            out.push(Tape::Word(((b as u16) << 6) | lo as u16));
            i += 2;
        }
    }
    out
}

fn data_words(tape: &[Tape]) -> Vec<u16> {
    tape.iter()
        .filter_map(|t| match t {
            Tape::Word(w) => Some(*w),
            _ => None,
        })
        .collect()
}

/// The BIN checksum property: the trailing word equals the sum of
/// all data and origin bytes, excluding the leader and field-change
/// bytes, modulo 2^12.
fn assert_checksum_balances(object: &[u8]) {
    let mut start = 0;
    while start < object.len() && object[start] == 0o200 {
        start += 1;
    }
    let mut end = object.len();
    while end > start && object[end - 1] == 0o200 {
        end -= 1;
    }
    let payload = &object[start..end];
    assert!(payload.len() >= 2, "no checksum word in payload");
    let (body, check) = payload.split_at(payload.len() - 2);
    let expected: u32 = body
        .iter()
        .filter(|&&b| b & 0o200 == 0)
        .map(|&b| b as u32)
        .sum();
    let checkword = (((check[0] & 0o77) as u32) << 6) | check[1] as u32;
    assert_eq!(expected % 4096, checkword, "checksum word does not balance");
}

fn assemble(source: &str, opts: &Options) -> Assembly {
    assemble_source("test.pal", source, opts).expect("assembly should not fail outright")
}

fn literals_on() -> Options {
    Options {
        literals: true,
        ..Options::default()
    }
}

#[test]
fn test_simple_program_stream_and_checksum() {
    let out = assemble("*200\n CLA\n HLT\n$\n", &Options::default());
    assert_eq!(out.error_count, 0);
    assert_eq!(&out.object[..LEADER_LEN], &[0o200u8; LEADER_LEN][..]);
    assert_eq!(out.object[out.object.len() - 1], 0o200);
    let tape = decode_bin(&out.object);
    assert_eq!(
        tape,
        vec![
            Tape::Origin(0o200),
            Tape::Word(0o7200),
            Tape::Word(0o7402),
            Tape::Word(0o0272), // checksum of 102 00 72 00 74 02
        ]
    );
    assert_checksum_balances(&out.object);
}

#[test]
fn test_current_page_mri_resolution() {
    let out = assemble("*200\nTAD LBL\nHLT\nLBL, 7\n$\n", &Options::default());
    assert_eq!(out.error_count, 0);
    let words = data_words(&decode_bin(&out.object));
    // TAD LBL at 0200 references 0202 on the same page.
    assert_eq!(words[0], 0o1202);
    assert_eq!(words[1], 0o7402);
    assert_eq!(words[2], 0o0007);
    assert_checksum_balances(&out.object);
}

#[test]
fn test_off_page_operand_goes_through_a_literal() {
    let out = assemble("*200\nTAD (123)\nHLT\n$\n", &literals_on());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let tape = decode_bin(&out.object);
    // The literal lands in the top slot of page 1 and the
    // instruction addresses it directly (same page).
    assert_eq!(tape[0], Tape::Origin(0o200));
    assert_eq!(tape[1], Tape::Word(0o1377));
    assert_eq!(tape[2], Tape::Word(0o7402));
    assert_eq!(tape[3], Tape::Origin(0o377));
    assert_eq!(tape[4], Tape::Word(0o0123));
    assert_checksum_balances(&out.object);
}

#[test]
fn test_off_page_reference_generates_indirection() {
    let source = "*200\nTAD FAR\nHLT\n*600\nFAR, 7\n$\n";
    let out = assemble(source, &literals_on());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let tape = decode_bin(&out.object);
    // TAD FAR becomes TAD I through a current-page literal holding
    // FAR's address, and the listing marks the word with @.
    assert_eq!(tape[1], Tape::Word(0o1777));
    assert!(tape.contains(&Tape::Origin(0o377)));
    assert!(tape.contains(&Tape::Word(0o600)));
    assert!(out.listing.contains("1777@"));
}

#[test]
fn test_off_page_without_literals_is_an_error() {
    let source = "*200\nTAD FAR\nHLT\n*600\nFAR, 7\n$\n";
    let out = assemble(source, &Options::default());
    assert!(out.error_count > 0);
    assert!(out.errors.contains("illegal reference"));
    assert!(out.listing.contains("IR off page"));
}

#[test]
fn test_redefinition_diagnoses_second_time_and_marks_table() {
    let opts = Options {
        dump_symbols: true,
        ..Options::default()
    };
    let out = assemble("A=5\nA=6\n$\n", &opts);
    assert_eq!(out.error_count, 1);
    assert!(out.errors.contains("redefined symbol \"A\""));
    assert!(out.listing.contains("RD redefined"));
    // The dump marks the redefined symbol and shows the final value.
    assert!(out.listing.contains("#A"));
    assert!(out.listing.contains("0006"));
}

#[test]
fn test_false_conditional_assembles_nothing() {
    let out = assemble("*200\nIFNZERO 0 <CLA>\nHLT\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let tape = decode_bin(&out.object);
    assert_eq!(
        data_words(&tape)
            .split_last()
            .expect("stream should end with a checksum")
            .1,
        &[0o7402]
    );
    assert_eq!(tape[0], Tape::Origin(0o200));
}

#[test]
fn test_conditionals_pick_the_same_branch_in_both_passes() {
    // FWD is defined only later in the file, so pass 1 skips the
    // block; pass 2 must skip it too even though the symbol is in
    // the table by then.
    let out = assemble("*200\nIFDEF FWD <CLA>\nHLT\nFWD, 7\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let words = data_words(&decode_bin(&out.object));
    assert_eq!(&words[..words.len() - 1], &[0o7402, 0o0007]);
}

#[test]
fn test_radix_switching_and_radix_error() {
    let out = assemble("DECIMAL\n9\nOCTAL\n9\n$\n", &Options::default());
    assert_eq!(out.error_count, 1);
    let words = data_words(&decode_bin(&out.object));
    assert_eq!(words[0], 0o0011);
    assert_eq!(words[1], 0o0000);
    assert!(out.errors.contains("number not in current radix"));
    assert!(out.listing.contains("IC radix"));
}

#[test]
fn test_rim_format_tags_every_word() {
    let opts = Options {
        rim: true,
        ..Options::default()
    };
    let out = assemble("*200\nCLA\nHLT\n$\n", &opts);
    assert_eq!(out.error_count, 0);
    let tape = decode_bin(&out.object);
    // No checksum in RIM mode; each word carries its origin.
    assert_eq!(
        tape,
        vec![
            Tape::Origin(0o200),
            Tape::Word(0o7200),
            Tape::Origin(0o201),
            Tape::Word(0o7402),
        ]
    );
}

#[test]
fn test_field_change_byte_is_punched_and_unsummed() {
    let out = assemble("*200\nCLA\nFIELD 1\nCLA\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let tape = decode_bin(&out.object);
    assert!(tape.contains(&Tape::FieldChange(0o310)));
    assert_checksum_balances(&out.object);
    // Field 1 location 0200 lists as 10200.
    assert!(out.listing.contains("10200"));
}

#[test]
fn test_text_packs_six_bit_pairs() {
    let out = assemble("*200\nTEXT \"AB\"\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let words = data_words(&decode_bin(&out.object));
    // 'A' = 01, 'B' = 02 packed; even strings end with a zero word.
    assert_eq!(&words[..2], &[0o0102, 0o0000]);
}

#[test]
fn test_text_odd_character_fills_high_half() {
    let out = assemble("*200\nTEXT \"ABC\"\n$\n", &Options::default());
    let words = data_words(&decode_bin(&out.object));
    assert_eq!(&words[..2], &[0o0102, 0o0300]);
}

#[test]
fn test_zblock_emits_zero_words() {
    let out = assemble("*200\nZBLOCK 3\nHLT\n$\n", &Options::default());
    assert_eq!(out.error_count, 0);
    let words = data_words(&decode_bin(&out.object));
    assert_eq!(&words[..4], &[0, 0, 0, 0o7402]);
}

#[test]
fn test_dubl_emits_high_then_low() {
    let out = assemble("*200\nDUBL 679\n-1\nHLT\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let words = data_words(&decode_bin(&out.object));
    // 679 = 0o1247; -1 is all ones across 24 bits.
    assert_eq!(&words[..5], &[0o0000, 0o1247, 0o7777, 0o7777, 0o7402]);
}

#[test]
fn test_fltg_emits_three_words() {
    let out = assemble("*200\nFLTG 1.5\nHLT\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let words = data_words(&decode_bin(&out.object));
    assert_eq!(&words[..4], &[0o0001, 0o3000, 0o0000, 0o7402]);
}

#[test]
fn test_literal_pools_deduplicate() {
    let out = assemble(
        "*200\nTAD (55)\nTAD (66)\nTAD (55)\nHLT\n$\n",
        &literals_on(),
    );
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let words = data_words(&decode_bin(&out.object));
    // First and third instructions share the 0377 slot.
    assert_eq!(words[0], 0o1377);
    assert_eq!(words[1], 0o1376);
    assert_eq!(words[2], 0o1377);
}

#[test]
fn test_page_zero_literal_uses_bracket_pool() {
    let out = assemble("*200\nTAD [77]\nHLT\n$\n", &literals_on());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    let tape = decode_bin(&out.object);
    // The bracket literal sits at the top of page zero and the TAD
    // addresses it as a page zero operand.
    assert_eq!(tape[1], Tape::Word(0o1177));
    assert!(tape.contains(&Tape::Origin(0o177)));
}

#[test]
fn test_xlist_suppresses_a_region_of_the_listing() {
    let out = assemble("*200\nCLA\nXLIST\nHLT\nXLIST\nJMP 200\n$\n", &Options::default());
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    assert!(out.listing.contains("CLA"));
    assert!(!out.listing.contains("HLT"));
    assert!(out.listing.contains("JMP"));
}

#[test]
fn test_nopunch_suppresses_object_but_not_checksum() {
    let with = assemble("*200\nCLA\nHLT\n$\n", &Options::default());
    let without = assemble("*200\nCLA\nNOPUNCH\nHLT\nENPUNCH\n$\n", &Options::default());
    // HLT is missing from the suppressed stream, but its bytes were
    // still folded into the checksum.
    let with_words = data_words(&decode_bin(&with.object));
    let without_words = data_words(&decode_bin(&without.object));
    assert!(with_words.contains(&0o7402));
    assert!(!without_words.contains(&0o7402));
    assert_eq!(with_words.last(), without_words.last());
}

#[test]
fn test_cross_reference_lists_definition_and_references() {
    let opts = Options {
        xref: true,
        ..Options::default()
    };
    let out = assemble("*200\nTAD LBL\nLBL, 7\n$\n", &opts);
    assert_eq!(out.error_count, 0, "errors: {}", out.errors);
    assert!(out.listing.contains("Cross Reference"));
    assert!(out.listing.contains("LBL"));
    // Defined at line 3, referenced at line 2.
    assert!(out.listing.contains(" A      3  LBL"));
}

#[test]
fn test_permanent_table_round_trips() {
    let opts = Options {
        permanent: true,
        ..Options::default()
    };
    let first = assemble("$\n", &opts);
    let prm1 = first.permanent.expect("a .prm text should be produced");
    let second = assemble(&prm1, &opts);
    let prm2 = second.permanent.expect("a .prm text should be produced");
    assert_eq!(prm1, prm2);
}

#[test]
fn test_listing_line_shapes() {
    let out = assemble("*200\nA=5\nCLA\n$\n", &Options::default());
    // Assignment lines show the value with no location; code lines
    // show line number, location and value.
    assert!(out.listing.contains("0005  A=5\n"));
    assert!(out.listing.contains("00200 7200  CLA\n"));
    assert!(out.listing.contains("No detected errors"));
}

#[test]
fn test_assemble_file_writes_and_cleans_artifacts() {
    let dir = tempfile::tempdir().expect("should be able to create a temp dir");
    let input = dir.path().join("prog.pal");
    let mut f = fs::File::create(&input).expect("should be able to create the source");
    f.write_all(b"*200\nCLA\nHLT\n$\n")
        .expect("should be able to write the source");
    drop(f);

    let assembly =
        assemble_file(&input, &Options::default()).expect("assembly should succeed");
    assert_eq!(assembly.error_count, 0);
    let bin = fs::read(dir.path().join("prog.bin")).expect("the object file should exist");
    assert_eq!(bin, assembly.object);
    let lst = fs::read_to_string(dir.path().join("prog.lst"))
        .expect("the listing file should exist");
    assert!(lst.contains("No detected errors"));
    assert!(
        !dir.path().join("prog.err").exists(),
        "a clean assembly must remove the error file"
    );

    // Now an erroneous program keeps its error file.
    let mut f = fs::File::create(&input).expect("should be able to rewrite the source");
    f.write_all(b"*200\nTAD NOWHER\n$\n")
        .expect("should be able to write the source");
    drop(f);
    let assembly = assemble_file(&input, &Options::default()).expect("assembly should succeed");
    assert_eq!(assembly.error_count, 1);
    let err = fs::read_to_string(dir.path().join("prog.err"))
        .expect("the error file should exist");
    assert!(err.contains("undefined symbol \"NOWHER\""));
}
