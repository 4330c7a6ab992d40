//! Tunnel output classification
//!
//! Turns the line stream of the driver + openconnect into lifecycle
//! observations. Every line is forwarded; classification only adds to it.

use crate::error::AuthFailure;
use crate::events::LogKind;
use crate::openconnect::markers::{self, DriverSignal};

/// Which pipe a line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The raw line, forwarded verbatim
    Line { kind: LogKind, text: String },
    /// First success marker of the session
    Connected,
    /// Extra message derived from the line
    Notice { kind: LogKind, text: String },
}

/// Per-session classifier state
#[derive(Debug, Default)]
pub struct OutputClassifier {
    connected: bool,
    auth_failure: Option<AuthFailure>,
    timed_out: bool,
}

impl OutputClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one line. Trailing `\r` from the pty is stripped; blank lines yield nothing.
    pub fn observe(&mut self, _stream: Stream, line: &str) -> Vec<Observation> {
        let text = line.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(2);

        if let Some(signal) = markers::driver_signal(text) {
            match signal {
                DriverSignal::AuthFailed(which) => {
                    // First sentinel wins
                    self.auth_failure.get_or_insert(which);
                }
                DriverSignal::Timeout => self.timed_out = true,
            }
            out.push(Observation::Line {
                kind: LogKind::Error,
                text: text.to_string(),
            });
            return out;
        }

        out.push(Observation::Line {
            kind: LogKind::Info,
            text: text.to_string(),
        });

        if !self.connected && markers::is_success_line(text) {
            self.connected = true;
            out.push(Observation::Connected);
            out.push(Observation::Notice {
                kind: LogKind::Success,
                text: markers::CONNECTED_NOTICE.to_string(),
            });
        }

        if markers::is_benign_noise(text) {
            out.push(Observation::Notice {
                kind: LogKind::Info,
                text: markers::BENIGN_NOISE_NOTICE.to_string(),
            });
        }

        out
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn auth_failure(&self) -> Option<AuthFailure> {
        self.auth_failure
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}
