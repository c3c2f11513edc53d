//! Domain types shared by every operator adapter.
//!
//! Records enforce their ordering invariants at construction time, so
//! code that receives an `EtaRecord` can display it as-is.

mod clock;
mod eta;
mod language;

pub use clock::Clock;
pub use eta::{EtaGroup, EtaRecord, EtaTime, hk_offset, parse_timestamp};
pub use language::Language;
