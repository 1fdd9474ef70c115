pub mod calendar;
pub mod changes;
pub mod connection;
pub mod dispatches;
pub mod technicians;

pub use changes::{ChangeStats, HistoryFilter};
pub use connection::{init_db, Database};
