//! pagewatch - acquire a challenge-protected, session-gated page through a
//! real browser and report how its content changed since the last run.
//!
//! A run goes through three stages:
//! - [`acquire::Orchestrator`] launches a browser backend, establishes a
//!   session with [`session::SessionManager`] and waits out challenge pages
//! - [`snapshot::SnapshotArchive`] stores the page as a timestamped artifact
//! - [`detect::ChangeDetector`] diffs it against the previous artifact and
//!   writes a JSON report
//!
//! [`run::execute`] wires the stages together.

pub mod acquire;
pub mod browser;
pub mod config;
pub mod detect;
pub mod error;
pub mod logging;
pub mod run;
pub mod session;
pub mod snapshot;

pub use acquire::{AcquisitionPolicy, Orchestrator};
pub use browser::{Backend, BackendKind, BrowsingContext, Locator};
pub use config::{RunConfig, SessionCredentials};
pub use detect::{ChangeDetector, ChangeReport, ReportFile};
pub use error::{Result, ScrapeError};
pub use session::{CookieJar, LoginOutcome, LoginStep, SessionCookie, SessionManager};
pub use snapshot::{PageSnapshot, SnapshotArchive};
