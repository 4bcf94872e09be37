use std::io::Cursor;

use common::{CharacterKind, EventStatus, Operation, SlotError, NAME_LIMIT, SLOT_COUNT};
use heaper::secret::StaticSecret;
use heaper::{Dispatch, Draft, Mode, Session, SessionEnd, SlotMachine, SlotTable};

fn run_script(script: &str) -> (SessionEnd, String, common::SessionTrace) {
    let mut output = Vec::new();
    let mut session = Session::new(
        Mode::Hardened.build(NAME_LIMIT),
        Box::new(StaticSecret("FLAG{never}".into())),
        Cursor::new(script.to_string()),
        &mut output,
    );
    let end = session.run().expect("session failed");
    let trace = session.into_trace();
    (end, String::from_utf8(output).unwrap(), trace)
}

#[test]
fn test_wizard_flies_until_deleted() {
    let script = "1\n0\n1\nMerlin\nArchie\n3\n0\n1\n2\n0\n3\n0\n4\n";
    let (end, output, trace) = run_script(script);

    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(output.matches("The wizard flies through the skies!").count(), 1);
    assert!(output.contains("Character deleted.\n"));
    assert!(output.contains("Slot is empty.\n"));

    let statuses: Vec<_> = trace.events.iter().map(|e| (e.operation, e.status)).collect();
    assert_eq!(statuses, vec![
        (Operation::Create, EventStatus::Ok),
        (Operation::Act, EventStatus::Ok),
        (Operation::Delete, EventStatus::Ok),
        (Operation::Act, EventStatus::SlotEmpty),
        (Operation::Exit, EventStatus::Ok),
    ]);
    assert!(trace.allocations.is_empty());
}

#[test]
fn test_human_introduces_itself() {
    let (_, output, _) = run_script("1 4 5 Bob 30\n3 4\n4\n");
    assert!(output.contains("Humans have no special abilities. Name: Bob, Age: 30\n"));
    // No action menu for humans
    assert!(!output.contains("1. Fly"));
}

#[test]
fn test_second_delete_is_rejected() {
    let (end, output, trace) = run_script("1 2 3 Sam\n2 2\n2 2\n4\n");
    assert_eq!(end, SessionEnd::Exit);
    assert_eq!(output.matches("Character deleted.").count(), 1);

    let last_delete = trace.events.iter().rev().find(|e| e.operation == Operation::Delete).unwrap();
    assert_eq!(last_delete.status, EventStatus::SlotEmpty);
    assert_eq!(last_delete.tag, None);
}

#[test]
fn test_slot_can_be_reused_after_delete() {
    let (_, output, trace) = run_script("1 1 4 Al\n2 1\n1 1 2 Ned Boo\n3 1 1\n4\n");
    assert!(output.contains("The necromancer invokes a spirit from beyond.\n"));
    assert!(!output.contains("Slot already occupied."));
    assert_eq!(trace.events[2].tag, Some(CharacterKind::Necromancer));
}

#[test]
fn test_create_on_occupied_slot() {
    let (_, output, trace) = run_script("1 0 3 Sam\n1 0\n4\n");
    assert!(output.contains("Slot already occupied.\n"));
    assert_eq!(trace.events[1].status, EventStatus::SlotOccupied);
    assert_eq!(trace.events[1].tag, Some(CharacterKind::Sorcerer));
}

#[test]
fn test_oversized_name_is_rejected() {
    let script = format!("1 0 4 {}\n3 0\n4\n", "A".repeat(64));
    let (_, output, trace) = run_script(&script);

    assert!(output.contains("Name too long.\n"));
    assert!(output.contains("Slot is empty.\n"));
    assert_eq!(trace.events[0].status, EventStatus::NameTooLong);
}

#[test]
fn test_invalid_variant_and_action() {
    let (_, output, trace) = run_script("1 0 9\n1 0 1 Merlin Archie\n3 0 3\n3 0 x\n4\n");
    assert_eq!(output.matches("Invalid choice.\n").count(), 3);
    assert_eq!(trace.events[0].status, EventStatus::InvalidChoice);
    assert_eq!(trace.events[0].tag, None);
}

#[test]
fn test_malformed_age() {
    let (_, output, trace) = run_script("1 3 5 Bob old\n3 3\n4\n");
    assert!(output.contains("Invalid choice.\n"));
    assert!(output.contains("Slot is empty.\n"));
    assert_eq!(trace.events[0].status, EventStatus::InvalidChoice);
}

#[test]
fn test_out_of_range_indices_leave_table_unchanged() {
    let mut table = SlotTable::new(NAME_LIMIT);
    table.create(0, &Draft::Sorcerer { name: "Sam".into() }).unwrap();

    for index in [-100, -1, 5, 6, i64::MAX, i64::MIN] {
        let draft = Draft::Alchemist { name: "Al".into() };
        assert_eq!(table.create(index, &draft), Err(SlotError::InvalidSlotIndex(index)));
        assert_eq!(table.delete(index), Err(SlotError::InvalidSlotIndex(index)));
        assert_eq!(table.act(index, Some(1)), Err(SlotError::InvalidSlotIndex(index)));
    }

    assert_eq!(table.occupied(), 1);
    assert_eq!(table.tag(0), Some(CharacterKind::Sorcerer));
    for i in 1..SLOT_COUNT {
        assert_eq!(table.tag(i), None);
    }
}

#[test]
fn test_every_kind_in_its_own_slot() {
    let mut table = SlotTable::new(NAME_LIMIT);
    let drafts = [
        Draft::Wizard { name: "Merlin".into(), pet_name: "Archie".into() },
        Draft::Necromancer { name: "Ned".into(), spirit_name: "Boo".into() },
        Draft::Sorcerer { name: "Sam".into() },
        Draft::Alchemist { name: "Al".into() },
        Draft::Human { name: "Bob".into(), age: Some(30) },
    ];
    for (i, draft) in drafts.iter().enumerate() {
        assert_eq!(table.create(i as i64, draft), Ok(draft.kind()));
    }

    assert_eq!(table.get(0).unwrap().name().as_bytes(), b"Merlin");
    assert!(matches!(table.act(1, Some(1)), Ok(Dispatch::Invoked(_))));
    assert_eq!(
        table.act(4, None),
        Ok(Dispatch::Describe { name: "Bob".into(), age: 30 })
    );
}
