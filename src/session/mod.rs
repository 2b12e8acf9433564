//! Session management: persisted cookies and the login state machine.

mod cookies;
mod login;

pub use cookies::{CookieJar, SessionCookie};
pub use login::{LoginLocators, LoginOutcome, LoginState, LoginStep, SessionManager};
