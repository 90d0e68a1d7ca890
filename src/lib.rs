// Library surface for the run tracking engine; the binary in main.rs is a
// thin headless front end over it.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geo;
pub mod history;
pub mod replay;
pub mod session;
pub mod simulate;
pub mod source;
pub mod summary;

pub use engine::RunEngine;
pub use error::{Error, Result};
pub use geo::Position;
pub use session::{SessionConfig, SessionSnapshot, SessionState};
pub use source::{PedometerReading, SourceKind};
pub use summary::RunSummary;
