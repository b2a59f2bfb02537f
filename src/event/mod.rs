//! Event taxonomy for the control loop
//!
//! Every occurrence the application must react to is an [`Event`]. The core
//! variants are closed (`Connect`, `Refresh`); applications extend the set
//! through their own event type `E`, carried by [`Event::App`].
//!
//! Events other than `Refresh` only come into existence by being pushed onto
//! the [`EventQueue`], so construction order is enqueue order. `Refresh` is
//! synthesized by the scheduler and handed straight to the application.

pub mod queue;

pub use queue::{EventQueue, EventSender};

use std::fmt;

/// Something the application must react to
#[derive(Debug, Clone, PartialEq)]
pub enum Event<E> {
    /// A connection attempt to the broker completed (successfully or not)
    Connect(ConnectEvent),
    /// The refresh interval elapsed with nothing else happening
    Refresh,
    /// Application-defined event
    App(E),
}

impl<E> Event<E> {
    /// Short variant name used in log output
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connect(_) => "ConnectEvent",
            Event::Refresh => "RefreshEvent",
            Event::App(_) => "AppEvent",
        }
    }

    /// True for a connect event carrying a success code
    pub fn is_successful_connect(&self) -> bool {
        matches!(self, Event::Connect(connect) if connect.code.is_success())
    }
}

/// Outcome of a single connect attempt, as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectEvent {
    pub flags: ConnectFlags,
    pub code: ConnectReturnCode,
}

impl ConnectEvent {
    pub fn new(flags: ConnectFlags, code: ConnectReturnCode) -> Self {
        Self { flags, code }
    }
}

/// CONNACK acknowledge flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectFlags {
    /// Broker resumed an existing session for this client id
    pub session_present: bool,
}

/// MQTT 3.1.1 CONNACK return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    RefusedProtocolVersion,
    BadClientId,
    ServiceUnavailable,
    BadUserNamePassword,
    NotAuthorized,
    Unknown(u8),
}

impl ConnectReturnCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ConnectReturnCode::Accepted)
    }

    /// Numeric code as carried on the wire
    pub fn code(&self) -> u8 {
        match self {
            ConnectReturnCode::Accepted => 0,
            ConnectReturnCode::RefusedProtocolVersion => 1,
            ConnectReturnCode::BadClientId => 2,
            ConnectReturnCode::ServiceUnavailable => 3,
            ConnectReturnCode::BadUserNamePassword => 4,
            ConnectReturnCode::NotAuthorized => 5,
            ConnectReturnCode::Unknown(code) => *code,
        }
    }
}

impl From<u8> for ConnectReturnCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::RefusedProtocolVersion,
            2 => ConnectReturnCode::BadClientId,
            3 => ConnectReturnCode::ServiceUnavailable,
            4 => ConnectReturnCode::BadUserNamePassword,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Unknown(other),
        }
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectReturnCode::Accepted => "Connection Accepted.",
            ConnectReturnCode::RefusedProtocolVersion => {
                "Connection Refused: unacceptable protocol version."
            }
            ConnectReturnCode::BadClientId => "Connection Refused: identifier rejected.",
            ConnectReturnCode::ServiceUnavailable => "Connection Refused: broker unavailable.",
            ConnectReturnCode::BadUserNamePassword => {
                "Connection Refused: bad user name or password."
            }
            ConnectReturnCode::NotAuthorized => "Connection Refused: not authorised.",
            ConnectReturnCode::Unknown(_) => "Connection Refused: unknown reason.",
        };
        f.write_str(text)
    }
}
