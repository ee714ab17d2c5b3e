//! Failure classification and the user-facing error surfaces.
//!
//! Every request outcome is classified into a [`RequestFailure`] at the
//! boundary of the request. The failure is then shown on exactly one
//! surface: a blocking [`Dialog`] for resource conflicts, or an
//! [`InlineNotice`] for everything else. An open dialog hides any inline
//! text until it is dismissed.

use chrono::{DateTime, Utc};

use crate::protocol::{ErrorBody, RequestOutcome};

/// Substring of a controller `detail` that marks a hardware magazine conflict.
pub const MAGAZINE_MARKER: &str = "Magazine";

/// Inline text shown while the game feed is gone for good.
pub const SESSION_LOST_TEXT: &str = "Connection to the game was lost. Reset to start a new game.";

/// Classified request failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    /// A hardware precondition failed (e.g. a magazine is empty).
    #[error("resource conflict: {detail}")]
    Conflict { detail: String },

    /// The controller refused the request for another reason.
    #[error("rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// No usable answer: refused connection, timeout, unreadable error body.
    #[error("network failure: {reason}")]
    Network { reason: String },
}

impl RequestFailure {
    /// Split an outcome into the success body or a classified failure.
    pub fn classify(outcome: &RequestOutcome) -> Result<String, RequestFailure> {
        match outcome {
            RequestOutcome::Response { status, body } if (200..300).contains(status) => {
                Ok(body.clone())
            }
            RequestOutcome::Response { status, body } => {
                match serde_json::from_str::<ErrorBody>(body) {
                    Ok(ErrorBody { detail }) if detail.contains(MAGAZINE_MARKER) => {
                        Err(Self::Conflict { detail })
                    }
                    Ok(ErrorBody { detail }) => Err(Self::Rejected {
                        status: *status,
                        detail,
                    }),
                    Err(_) => Err(Self::Network {
                        reason: format!("status {status} with unreadable body"),
                    }),
                }
            }
            RequestOutcome::Failed { reason } => Err(Self::Network {
                reason: reason.clone(),
            }),
            RequestOutcome::TimedOut => Err(Self::Network {
                reason: "request timed out".to_string(),
            }),
        }
    }
}

/// The user action a failure belongs to; picks titles and fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartGame,
    MakeMove,
}

impl Action {
    pub fn dialog_title(&self) -> &'static str {
        match self {
            Self::StartGame => "Cannot Start Game",
            Self::MakeMove => "Cannot Make Move",
        }
    }

    pub fn network_text(&self) -> &'static str {
        match self {
            Self::StartGame => "Could not connect to backend",
            Self::MakeMove => "Move failed",
        }
    }
}

/// Blocking notice. Only an explicit dismiss removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Non-blocking text above the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineNotice {
    pub text: String,
    /// Survives successful actions; only a reset clears it
    pub persistent: bool,
    pub raised_at: DateTime<Utc>,
}

/// What the renderer should show right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface<'a> {
    Dialog(&'a Dialog),
    Inline(&'a InlineNotice),
}

/// The session's error surfaces.
#[derive(Debug, Clone, Default)]
pub struct Notices {
    dialog: Option<Dialog>,
    inline: Option<InlineNotice>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single active surface. A dialog always wins.
    pub fn visible(&self) -> Option<Surface<'_>> {
        match (&self.dialog, &self.inline) {
            (Some(dialog), _) => Some(Surface::Dialog(dialog)),
            (None, Some(inline)) => Some(Surface::Inline(inline)),
            (None, None) => None,
        }
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    pub fn inline(&self) -> Option<&InlineNotice> {
        self.inline.as_ref()
    }

    /// Show `failure` on the surface its category calls for.
    pub fn report(&mut self, action: Action, failure: &RequestFailure) {
        match failure {
            RequestFailure::Conflict { detail } => self.raise_dialog(action.dialog_title(), detail),
            RequestFailure::Rejected { detail, .. } => self.raise_inline(detail),
            RequestFailure::Network { .. } => self.raise_inline(action.network_text()),
        }
    }

    pub fn raise_dialog(&mut self, title: &str, message: &str) {
        self.dialog = Some(Dialog {
            title: title.to_string(),
            message: message.to_string(),
            raised_at: Utc::now(),
        });
    }

    /// Transient inline text. Never replaces a persistent notice.
    pub fn raise_inline(&mut self, text: &str) {
        if self.inline.as_ref().is_some_and(|n| n.persistent) {
            return;
        }
        self.inline = Some(InlineNotice {
            text: text.to_string(),
            persistent: false,
            raised_at: Utc::now(),
        });
    }

    pub fn raise_persistent(&mut self, text: &str) {
        self.inline = Some(InlineNotice {
            text: text.to_string(),
            persistent: true,
            raised_at: Utc::now(),
        });
    }

    pub fn dismiss_dialog(&mut self) -> Option<Dialog> {
        self.dialog.take()
    }

    /// Drop transient inline text after a successful action.
    pub fn clear_transient(&mut self) {
        if self.inline.as_ref().is_some_and(|n| !n.persistent) {
            self.inline = None;
        }
    }

    pub fn clear_all(&mut self) {
        self.dialog = None;
        self.inline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn error(status: u16, detail: &str) -> RequestOutcome {
        RequestOutcome::status(status, serde_json::json!({ "detail": detail }).to_string())
    }

    #[test]
    fn test_classify_success() {
        assert_eq!(
            RequestFailure::classify(&RequestOutcome::ok("{\"status\":\"ok\"}")),
            Ok("{\"status\":\"ok\"}".to_string())
        );
        assert_eq!(
            RequestFailure::classify(&RequestOutcome::status(204, "")),
            Ok(String::new())
        );
    }

    #[test]
    fn test_classify_magazine_conflict() {
        let failure = RequestFailure::classify(&error(400, "Magazine 1 full")).unwrap_err();
        assert_eq!(
            failure,
            RequestFailure::Conflict {
                detail: "Magazine 1 full".to_string()
            }
        );
    }

    #[test]
    fn test_classify_other_rejections() {
        assert_eq!(
            RequestFailure::classify(&error(400, "Invalid move.")),
            Err(RequestFailure::Rejected {
                status: 400,
                detail: "Invalid move.".to_string()
            })
        );
        assert!(matches!(
            RequestFailure::classify(&error(500, "Internal server error: boom")),
            Err(RequestFailure::Rejected { status: 500, .. })
        ));
    }

    #[test]
    fn test_classify_network_failures() {
        let cases = [
            RequestOutcome::status(502, "<html>Bad Gateway</html>"),
            RequestOutcome::status(400, "{\"error\":\"no detail\"}"),
            RequestOutcome::Failed {
                reason: "connection refused".to_string(),
            },
            RequestOutcome::TimedOut,
        ];
        for outcome in &cases {
            assert!(matches!(
                RequestFailure::classify(outcome),
                Err(RequestFailure::Network { .. })
            ));
        }
    }

    #[test]
    fn test_report_routes_by_category() {
        let mut notices = Notices::new();
        notices.report(
            Action::StartGame,
            &RequestFailure::Conflict {
                detail: "Magazine 2 is empty".to_string(),
            },
        );
        let dialog = notices.dialog().unwrap();
        assert_eq!(dialog.title, "Cannot Start Game");
        assert_eq!(dialog.message, "Magazine 2 is empty");

        notices.report(
            Action::MakeMove,
            &RequestFailure::Network {
                reason: "timeout".to_string(),
            },
        );
        assert_eq!(notices.inline().unwrap().text, "Move failed");
    }

    #[test]
    fn test_dialog_hides_inline_until_dismissed() {
        let mut notices = Notices::new();
        notices.raise_inline("Could not connect to backend");
        notices.raise_dialog("Cannot Start Game", "Magazine 1 full");

        assert!(matches!(notices.visible(), Some(Surface::Dialog(_))));

        notices.dismiss_dialog();
        match notices.visible() {
            Some(Surface::Inline(n)) => assert_eq!(n.text, "Could not connect to backend"),
            other => panic!("expected inline notice, got {:?}", other),
        }
    }

    #[test]
    fn test_persistent_notice_outlives_transient_traffic() {
        let mut notices = Notices::new();
        notices.raise_persistent(SESSION_LOST_TEXT);
        notices.raise_inline("Move failed");
        notices.clear_transient();

        let inline = notices.inline().unwrap();
        assert!(inline.persistent);
        assert_eq!(inline.text, SESSION_LOST_TEXT);

        notices.clear_all();
        assert!(notices.visible().is_none());
    }

    #[test]
    fn test_clear_transient() {
        let mut notices = Notices::new();
        notices.raise_inline("Move failed");
        notices.clear_transient();
        assert!(notices.inline().is_none());
    }
}
