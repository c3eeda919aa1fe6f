//! code-recorder: editor session recording with replayable exports
//!
//! A host editor forwards document focus changes and content edits to a
//! [`Recorder`]. Each session appends rows to its own CSV row log; stopping
//! the session replays the log into timed full-text snapshots written as SRT
//! subtitles and a JSON document next to the log.
//!
//! # Example
//!
//! ```no_run
//! use code_recorder::{DocumentSnapshot, EditEvent, ContentChange, Recorder, RecorderConfig};
//!
//! # fn main() -> code_recorder::Result<()> {
//! let mut recorder = Recorder::builder()
//!     .config(RecorderConfig::default())
//!     .workspace("/work/project")
//!     .build();
//!
//! let doc = DocumentSnapshot {
//!     file: "/work/project/src/main.rs".into(),
//!     language: "rust".into(),
//!     text: "fn main() {}".into(),
//! };
//! recorder.start(Some(&doc))?;
//! recorder.on_edit_event(&EditEvent {
//!     file: doc.file.clone(),
//!     language: doc.language.clone(),
//!     changes: vec![ContentChange { range_offset: 11, range_length: 0, text: "\n".into() }],
//! })?;
//! let summary = recorder.stop()?;
//! println!("{} changes exported", summary.changes);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod destination;
pub mod error;
pub mod notify;
pub mod recorder;
pub mod session;

pub use config::{EnvConfig, RecorderConfig};
pub use error::{RecorderError, Result};
pub use notify::{Listener, Notification, RecorderEvent, Severity};
pub use recorder::{ContentChange, DocumentSnapshot, EditEvent, Recorder, RecorderBuilder};
pub use session::{
    Clock, ManualClock, Session, SessionId, SessionOutcome, SessionState, SystemClock,
};

pub use edit_log::{ExportFormat, ExportSummary, FaultPolicy};
