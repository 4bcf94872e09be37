//! Menu loop driving a slot table over a console.

mod input;

pub use input::{Scan, TokenReader};

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use common::{CharacterKind, EventStatus, Fault, Handler, Operation, SessionTrace, SlotError};
use log::{debug, error, info, warn};

use crate::character::Draft;
use crate::config::Config;
use crate::secret::{FileSecret, SecretResource};
use crate::table::{slot_index, Dispatch, Release, SlotMachine};
use crate::trace::Journal;

const MENU: &str = "\n[Heap-er fort] Magical strongest\n\n\
    1. Create character\n\
    2. Delete character\n\
    3. Perform action\n\
    4. Exit\n\
    Choice: ";

const SLOT_PROMPT: &str = "Choose a character slot (0-4): ";

const KIND_MENU: &str = "1. Wizard\n2. Necromancer\n3. Sorcerer\n4. Alchemist\n5. Human\nChoice: ";

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user picked Exit
    Exit,
    /// Input ran out
    EndOfInput,
    /// The simulated target died
    Crashed(Fault),
}

impl SessionEnd {
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionEnd::Exit | SessionEnd::EndOfInput => 0,
            SessionEnd::Crashed(fault) => fault.exit_code(),
        }
    }
}

/// An interactive session over one slot table
pub struct Session<R, W> {
    table: Box<dyn SlotMachine>,
    secret: Box<dyn SecretResource>,
    input: TokenReader<R>,
    output: W,
    journal: Journal,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(table: Box<dyn SlotMachine>, secret: Box<dyn SecretResource>, input: R, output: W) -> Self {
        Self {
            table,
            secret,
            input: TokenReader::new(input),
            output,
            journal: Journal::new(),
        }
    }

    /// Session with the table and secret described by `config`. Events are
    /// only journaled when the config asks for a trace file.
    pub fn from_config(config: &Config, input: R, output: W) -> Self {
        let table = config.mode.build(config.name_limit);
        let secret = Box::new(FileSecret::new(&config.secret_path));
        let journal = match config.trace_path {
            Some(_) => Journal::new(),
            None => Journal::disabled(),
        };
        Self::new(table, secret, input, output).with_journal(journal)
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn table(&self) -> &dyn SlotMachine {
        self.table.as_ref()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Consume the session, keeping its journal and heap ledger
    pub fn into_trace(self) -> SessionTrace {
        let allocations = self.table.allocations();
        self.journal.into_trace(allocations)
    }

    /// Serve menu commands until exit, end of input or a fault
    pub fn run(&mut self) -> Result<SessionEnd> {
        info!("session started");
        loop {
            if let Some(end) = self.step()? {
                info!("session ended: {:?}", end);
                return Ok(end);
            }
        }
    }

    /// Handle one menu command
    pub fn step(&mut self) -> Result<Option<SessionEnd>> {
        self.prompt(MENU)?;
        match self.input.int()? {
            Scan::End => Ok(Some(SessionEnd::EndOfInput)),
            Scan::Value(1) => self.create_character(),
            Scan::Value(2) => self.delete_character(),
            Scan::Value(3) => self.perform_action(),
            Scan::Value(4) => {
                writeln!(self.output, "Goodbye!")?;
                self.journal.record(Operation::Exit, 0, None, EventStatus::Ok);
                Ok(Some(SessionEnd::Exit))
            }
            Scan::Value(_) | Scan::Malformed => {
                self.report(&SlotError::InvalidChoice)?;
                Ok(None)
            }
        }
    }

    fn create_character(&mut self) -> Result<Option<SessionEnd>> {
        let Some(index) = self.read_slot(Operation::Create)? else {
            return Ok(Some(SessionEnd::EndOfInput));
        };
        let Some(index) = index else { return Ok(None) };

        if let Err(e) = self.table.check_vacant(index) {
            return self.fail(Operation::Create, index, e);
        }

        self.prompt(KIND_MENU)?;
        let kind = match self.input.int()? {
            Scan::End => return Ok(Some(SessionEnd::EndOfInput)),
            Scan::Value(choice) => CharacterKind::from_choice(choice),
            Scan::Malformed => None,
        };
        let Some(kind) = kind else {
            return self.fail(Operation::Create, index, SlotError::InvalidChoice);
        };

        let Some(draft) = self.read_draft(kind)? else {
            return Ok(Some(SessionEnd::EndOfInput));
        };

        match self.table.create(index, &draft) {
            Ok(kind) => {
                self.journal.record(Operation::Create, index, Some(kind), EventStatus::Ok);
                Ok(None)
            }
            Err(e) => self.fail(Operation::Create, index, e),
        }
    }

    fn delete_character(&mut self) -> Result<Option<SessionEnd>> {
        let Some(index) = self.read_slot(Operation::Delete)? else {
            return Ok(Some(SessionEnd::EndOfInput));
        };
        let Some(index) = index else { return Ok(None) };

        match self.table.delete(index) {
            Ok(Release::Freed) => {
                writeln!(self.output, "Character deleted.")?;
                let tag = self.tag_of(index);
                self.journal.record(Operation::Delete, index, tag, EventStatus::Ok);
                Ok(None)
            }
            Ok(Release::Crash(fault)) => self.crash(Operation::Delete, index, fault),
            Err(e) => self.fail(Operation::Delete, index, e),
        }
    }

    fn perform_action(&mut self) -> Result<Option<SessionEnd>> {
        let Some(index) = self.read_slot(Operation::Act)? else {
            return Ok(Some(SessionEnd::EndOfInput));
        };
        let Some(index) = index else { return Ok(None) };

        let kind = match self.table.check_live(index) {
            Ok(kind) => kind,
            Err(e) => return self.fail(Operation::Act, index, e),
        };

        let choice = if kind.actions().is_empty() {
            None
        } else {
            let menu = action_menu(kind);
            self.prompt(&menu)?;
            match self.input.int()? {
                Scan::End => return Ok(Some(SessionEnd::EndOfInput)),
                Scan::Malformed => return self.fail(Operation::Act, index, SlotError::InvalidChoice),
                Scan::Value(choice) => Some(choice),
            }
        };

        let dangling = slot_index(index).map_or(false, |i| self.table.is_dangling(i));
        let dispatch = match self.table.act(index, choice) {
            Ok(dispatch) => dispatch,
            Err(e) => return self.fail(Operation::Act, index, e),
        };

        match dispatch {
            Dispatch::Invoked(handler) => self.invoke(handler)?,
            Dispatch::Describe { name, age } => {
                self.output.write_all(b"Humans have no special abilities. Name: ")?;
                self.output.write_all(&name)?;
                writeln!(self.output, ", Age: {}", age)?;
            }
            Dispatch::Crash(fault) => return self.crash(Operation::Act, index, fault),
        }

        let status = if dangling { EventStatus::Dangling } else { EventStatus::Ok };
        self.journal.record(Operation::Act, index, Some(kind), status);
        Ok(None)
    }

    fn invoke(&mut self, handler: Handler) -> Result<()> {
        if handler != Handler::Win {
            writeln!(self.output, "{}", handler.line())?;
            return Ok(());
        }

        write!(self.output, "{}", handler.line())?;
        match self.secret.reveal() {
            Ok(secret) => write!(self.output, "{}", secret)?,
            Err(e) => error!("{:#}", e),
        }
        self.output.flush()?;
        Ok(())
    }

    /// Read a slot index. The outer `None` means input ended, the inner one
    /// that the token was malformed and has already been reported.
    fn read_slot(&mut self, operation: Operation) -> Result<Option<Option<i64>>> {
        self.prompt(SLOT_PROMPT)?;
        match self.input.int()? {
            Scan::End => Ok(None),
            Scan::Value(index) => Ok(Some(Some(index))),
            Scan::Malformed => {
                self.fail(operation, -1, SlotError::InvalidChoice)?;
                Ok(Some(None))
            }
        }
    }

    /// Collect the fields for `kind`; `None` if input ended midway
    fn read_draft(&mut self, kind: CharacterKind) -> Result<Option<Draft>> {
        let Some(name) = self.ask(&format!("Enter {}'s name: ", kind.label()))? else {
            return Ok(None);
        };

        let draft = match kind {
            CharacterKind::Wizard => {
                let Some(pet_name) = self.ask("Enter wizard's pet name: ")? else {
                    return Ok(None);
                };
                Draft::Wizard { name, pet_name }
            }
            CharacterKind::Necromancer => {
                let Some(spirit_name) = self.ask("Enter spirit name: ")? else {
                    return Ok(None);
                };
                Draft::Necromancer { name, spirit_name }
            }
            CharacterKind::Sorcerer => Draft::Sorcerer { name },
            CharacterKind::Alchemist => Draft::Alchemist { name },
            CharacterKind::Human => {
                self.prompt("Enter human's age: ")?;
                let age = match self.input.int()? {
                    Scan::End => return Ok(None),
                    Scan::Value(age) => Some(age),
                    Scan::Malformed => None,
                };
                Draft::Human { name, age }
            }
        };
        Ok(Some(draft))
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<Vec<u8>>> {
        self.prompt(prompt)?;
        Ok(self.input.word()?)
    }

    fn prompt(&mut self, text: &str) -> Result<()> {
        write!(self.output, "{}", text)?;
        self.output.flush().context("Failed to flush console output")
    }

    fn report(&mut self, error: &SlotError) -> Result<()> {
        debug!("rejected: {:?}", error);
        let message = self.table.message(error);
        writeln!(self.output, "{}", message)?;
        Ok(())
    }

    fn fail(&mut self, operation: Operation, index: i64, error: SlotError) -> Result<Option<SessionEnd>> {
        self.report(&error)?;
        let tag = self.tag_of(index);
        self.journal.record(operation, index, tag, error.status());
        Ok(None)
    }

    fn crash(&mut self, operation: Operation, index: i64, fault: Fault) -> Result<Option<SessionEnd>> {
        warn!("slot {}: {:?} at {:#x}", index, fault, fault.address());
        writeln!(self.output, "{}", fault)?;
        self.output.flush()?;
        let tag = self.tag_of(index);
        self.journal.record(operation, index, tag, EventStatus::Fault);
        Ok(Some(SessionEnd::Crashed(fault)))
    }

    fn tag_of(&self, index: i64) -> Option<CharacterKind> {
        slot_index(index).ok().and_then(|i| self.table.tag(i))
    }
}

/// Numbered action menu for `kind`
fn action_menu(kind: CharacterKind) -> String {
    let mut menu = String::new();
    for (i, action) in kind.actions().iter().enumerate() {
        menu.push_str(&format!("{}. {}\n", i + 1, action.label()));
    }
    menu.push_str("Choice: ");
    menu
}
