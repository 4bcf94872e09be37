pub mod character;
pub mod config;
pub mod console;
pub mod heap;
pub mod legacy;
pub mod secret;
pub mod table;
pub mod trace;

pub use character::{BoundedName, Character, Draft};
pub use config::{Config, ConfigManager};
pub use console::{Session, SessionEnd};
pub use legacy::LegacyTable;
pub use table::{Dispatch, Mode, Release, SlotMachine, SlotTable};
