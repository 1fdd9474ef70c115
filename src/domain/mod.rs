pub mod calendar;
pub mod changes;
pub mod dispatch;
pub mod location;
pub mod technician;

pub use calendar::{CalendarEntry, CalendarUpdate};
pub use changes::{ChangeRecord, Operation, Snapshot};
pub use dispatch::{Dispatch, Priority};
pub use location::Location;
pub use technician::Technician;
