use std::io::Cursor;

use common::{CharacterKind, EventStatus, Fault, Handler, Operation, SessionTrace};
use heaper::secret::StaticSecret;
use heaper::{Dispatch, Draft, LegacyTable, Mode, Release, Session, SessionEnd, SlotMachine};

const FLAG: &str = "FLAG{dangling_function_pointer}\n";

fn run_script(script: &str) -> (SessionEnd, String, SessionTrace) {
    let (end, output, trace) = run_bytes(script.as_bytes());
    (end, String::from_utf8(output).unwrap(), trace)
}

fn run_bytes(script: &[u8]) -> (SessionEnd, Vec<u8>, SessionTrace) {
    let mut output = Vec::new();
    let mut session = Session::new(
        Mode::Legacy.build(0),
        Box::new(StaticSecret(FLAG.into())),
        Cursor::new(script.to_vec()),
        &mut output,
    );
    let end = session.run().expect("session failed");
    let trace = session.into_trace();
    (end, output, trace)
}

#[test]
fn test_deleted_wizard_still_flies() {
    let script = "1\n0\n1\nMerlin\nArchie\n3\n0\n1\n2\n0\n3\n0\n1\n4\n";
    let (end, output, trace) = run_script(script);

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(output.matches("The wizard flies through the skies!").count(), 2);

    let act = trace.events.iter().rev().find(|e| e.operation == Operation::Act).unwrap();
    assert_eq!(act.status, EventStatus::Dangling);
    assert_eq!(act.tag, Some(CharacterKind::Wizard));
    assert_eq!(trace.allocations.len(), 1);
    assert!(trace.allocations[0].is_freed);
}

#[test]
fn test_tag_survives_delete() {
    let mut table = LegacyTable::new();
    table.create(0, &Draft::Wizard { name: "Merlin".into(), pet_name: "Archie".into() }).unwrap();

    assert_eq!(table.delete(0), Ok(Release::Freed));
    assert_eq!(table.tag(0), Some(CharacterKind::Wizard));
    assert_eq!(table.check_live(0), Ok(CharacterKind::Wizard));
    assert_eq!(table.act(0, Some(2)), Ok(Dispatch::Invoked(Handler::Magic)));
}

#[test]
fn test_deleted_slot_cannot_be_recreated() {
    let (_, output, _) = run_script("1 0 3 Sam\n2 0\n1 0\n4\n");
    assert!(output.contains("Slot already occupied.\n"));
}

#[test]
fn test_double_free_aborts() {
    let (end, output, trace) = run_script("1 0 3 Sam\n2 0\n2 0\n4\n");

    assert!(matches!(end, SessionEnd::Crashed(Fault::DoubleFree { .. })));
    assert_eq!(end.exit_code(), 134);
    assert!(output.ends_with("free(): double free detected in tcache 2\n"));
    assert!(!output.contains("Goodbye!"));
    assert_eq!(trace.events.last().map(|e| e.status), Some(EventStatus::Fault));
}

#[test]
fn test_reused_chunk_redirects_to_win() {
    let win = Handler::Win.address();
    let script = format!("1 1 3 Sam\n2 1\n1 2 5 Eve {}\n3 1 1\n4\n", win);
    let (end, output, _) = run_script(&script);

    assert_eq!(end, SessionEnd::Exit);
    assert!(output.contains(&format!(" Here is your flag:{}", FLAG)));
    assert!(!output.contains("The sorcerer casts a powerful spell."));
}

#[test]
fn test_reused_chunk_with_garbage_faults() {
    let (end, output, trace) = run_script("1 1 4 Al\n2 1\n1 3 5 Eve 1234\n3 1 1\n4\n");

    assert_eq!(end, SessionEnd::Crashed(Fault::SegmentationFault { address: 1234 }));
    assert_eq!(end.exit_code(), 139);
    assert!(output.ends_with("Segmentation fault\n"));
    assert_eq!(trace.events.last().map(|e| e.operation), Some(Operation::Act));
}

#[test]
fn test_type_confusion_through_stale_human() {
    let mut table = LegacyTable::new();
    table.create(0, &Draft::Human { name: "Bob".into(), age: Some(30) }).unwrap();
    table.delete(0).unwrap();
    table.create(1, &Draft::Alchemist { name: "Al".into() }).unwrap();

    // Both slots now share one chunk
    assert_eq!(table.pointer(0), table.pointer(1));
    assert!(table.is_dangling(0));
    assert!(!table.is_dangling(1));

    // The human's age is read out of the alchemist's function pointer
    assert_eq!(
        table.act(0, None),
        Ok(Dispatch::Describe { name: "Al".into(), age: Handler::Potion.address() as i32 })
    );
}

#[test]
fn test_stale_delete_frees_live_neighbour() {
    let mut table = LegacyTable::new();
    table.create(0, &Draft::Sorcerer { name: "Sam".into() }).unwrap();
    table.delete(0).unwrap();
    table.create(1, &Draft::Sorcerer { name: "Sue".into() }).unwrap();

    // Slot 0 still points at the chunk slot 1 now owns
    assert_eq!(table.delete(0), Ok(Release::Freed));
    assert!(table.is_dangling(1));
    assert_eq!(table.tag(1), Some(CharacterKind::Sorcerer));
}

#[test]
fn test_long_names_overflow_into_record() {
    let mut table = LegacyTable::new();
    let name = vec![b'N'; 70];
    table.create(0, &Draft::Sorcerer { name }).unwrap();

    // The pointer is written after the name, so dispatch still works
    assert_eq!(table.act(0, Some(1)), Ok(Dispatch::Invoked(Handler::Spell)));

    let address = table.pointer(0).unwrap();
    assert_eq!(table.heap().read(address, 0, 64), Some(&[b'N'; 64][..]));
}

#[test]
fn test_human_name_overflow_redirects_neighbour() {
    // Two adjacent sorcerers; the first chunk is handed to a human whose name
    // runs through the second chunk's header and over its spell pointer
    let mut script = b"1 0 3 Sam\n1 1 3 Sue\n2 0\n1 2 5 ".to_vec();
    script.extend_from_slice(&[b'A'; 72 + 8 + 64]);
    script.extend_from_slice(b"\xd8\x12\x40 30\n3 1 1\n4\n");

    let (end, output, trace) = run_bytes(&script);
    let output = String::from_utf8_lossy(&output);

    assert_eq!(end, SessionEnd::Exit);
    assert!(output.contains(&format!(" Here is your flag:{}", FLAG)));
    assert!(!output.contains("The sorcerer casts a powerful spell."));

    // Slot 1 was never freed, so the call is not a stale dispatch
    let act = trace.events.iter().find(|e| e.operation == Operation::Act).unwrap();
    assert_eq!(act.status, EventStatus::Ok);
    assert_eq!(act.slot, 1);
}

#[test]
fn test_empty_slot_prints_invalid_slot() {
    let (end, output, _) = run_script("2 3\n3 3\n4\n");
    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(output.matches("Invalid slot.\n").count(), 2);
    assert!(!output.contains("Slot is empty."));
}

