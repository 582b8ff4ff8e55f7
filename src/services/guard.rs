//! Access decision for pages that require a signed-in user.

use crate::domain::session::{Identity, Session};

/// Where unauthenticated visitors are sent.
pub const SIGN_IN_PATH: &str = "/";

#[derive(Debug, PartialEq, Eq)]
pub enum Guard<'a> {
    /// The session check has not resolved; render a neutral placeholder.
    Loading,
    /// Replace the current location with this path.
    Redirect(&'static str),
    Allow(&'a Identity),
}

pub fn check(session: &Session) -> Guard<'_> {
    if session.is_loading {
        return Guard::Loading;
    }
    match session.identity() {
        Some(identity) => Guard::Allow(identity),
        None => Guard::Redirect(SIGN_IN_PATH),
    }
}
