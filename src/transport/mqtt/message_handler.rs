//! Pure routing of rumqttc poll results
//!
//! The network task polls the rumqttc event loop and asks this module what
//! each result means for the connection lifecycle.

use crate::event::{ConnectFlags, ConnectReturnCode};
use rumqttc::{ConnectionError, Event, Packet};

/// Pure routing decisions based on rumqttc poll results
pub struct MessageHandler;

impl MessageHandler {
    /// Route one `EventLoop::poll` result (pure routing decision)
    pub fn route_poll_result(result: &Result<Event, ConnectionError>) -> EventRoute {
        match result {
            Ok(event) => Self::route_mqtt_event(event),
            Err(ConnectionError::ConnectionRefused(code)) => EventRoute::ConnectionRefused {
                code: Self::map_return_code(code),
            },
            Err(error) => EventRoute::NetworkError(error.to_string()),
        }
    }

    /// Route a successfully polled event
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(connack)) => {
                let code = Self::map_return_code(&connack.code);
                let flags = ConnectFlags {
                    session_present: connack.session_present,
                };
                if code.is_success() {
                    EventRoute::ConnectionAcknowledged { flags }
                } else {
                    EventRoute::ConnectionRefused { code }
                }
            }
            Event::Incoming(Packet::Disconnect) => EventRoute::Disconnected,
            Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Map rumqttc's CONNACK code onto the transport-independent one
    pub fn map_return_code(code: &rumqttc::ConnectReturnCode) -> ConnectReturnCode {
        match code {
            rumqttc::ConnectReturnCode::Success => ConnectReturnCode::Accepted,
            rumqttc::ConnectReturnCode::RefusedProtocolVersion => {
                ConnectReturnCode::RefusedProtocolVersion
            }
            rumqttc::ConnectReturnCode::BadClientId => ConnectReturnCode::BadClientId,
            rumqttc::ConnectReturnCode::ServiceUnavailable => ConnectReturnCode::ServiceUnavailable,
            rumqttc::ConnectReturnCode::BadUserNamePassword => {
                ConnectReturnCode::BadUserNamePassword
            }
            rumqttc::ConnectReturnCode::NotAuthorized => ConnectReturnCode::NotAuthorized,
        }
    }
}

/// Routing decisions for rumqttc poll results
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK with success code
    ConnectionAcknowledged { flags: ConnectFlags },
    /// Broker refused the connection
    ConnectionRefused { code: ConnectReturnCode },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Socket, TLS or protocol failure; the next poll reconnects
    NetworkError(String),
    /// Infrastructure event (PingResp, PubAck, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Outgoing};

    #[test]
    fn test_route_successful_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: true,
            code: rumqttc::ConnectReturnCode::Success,
        }));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionAcknowledged {
                flags: ConnectFlags {
                    session_present: true
                }
            }
        );
    }

    #[test]
    fn test_route_refused_connack() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: rumqttc::ConnectReturnCode::NotAuthorized,
        }));

        assert_eq!(
            MessageHandler::route_mqtt_event(&event),
            EventRoute::ConnectionRefused {
                code: ConnectReturnCode::NotAuthorized
            }
        );
    }

    #[test]
    fn test_route_connection_refused_error() {
        let result = Err(ConnectionError::ConnectionRefused(
            rumqttc::ConnectReturnCode::BadUserNamePassword,
        ));

        assert_eq!(
            MessageHandler::route_poll_result(&result),
            EventRoute::ConnectionRefused {
                code: ConnectReturnCode::BadUserNamePassword
            }
        );
    }

    #[test]
    fn test_route_network_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let result = Err(ConnectionError::Io(io));

        assert!(matches!(
            MessageHandler::route_poll_result(&result),
            EventRoute::NetworkError(message) if message.contains("reset by peer")
        ));
    }

    #[test]
    fn test_route_disconnect_and_outgoing() {
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::Disconnect)),
            EventRoute::Disconnected
        );
        assert_eq!(
            MessageHandler::route_mqtt_event(&Event::Outgoing(Outgoing::PingReq)),
            EventRoute::OutgoingEvent
        );
        assert!(matches!(
            MessageHandler::route_mqtt_event(&Event::Incoming(Packet::PingResp)),
            EventRoute::InfrastructureEvent(_)
        ));
    }

    #[test]
    fn test_all_return_codes_map() {
        let codes = [
            (rumqttc::ConnectReturnCode::Success, 0),
            (rumqttc::ConnectReturnCode::RefusedProtocolVersion, 1),
            (rumqttc::ConnectReturnCode::BadClientId, 2),
            (rumqttc::ConnectReturnCode::ServiceUnavailable, 3),
            (rumqttc::ConnectReturnCode::BadUserNamePassword, 4),
            (rumqttc::ConnectReturnCode::NotAuthorized, 5),
        ];
        for (code, wire) in codes {
            assert_eq!(MessageHandler::map_return_code(&code).code(), wire);
        }
    }
}
