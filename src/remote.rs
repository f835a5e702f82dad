//! Remote-command protocol over the D-Bus session bus.
//!
//! The server listens for argument-less broadcast signals on its own
//! interface and forwards each recognized one to the control loop as a
//! [`Command`]. The client side sends exactly one signal and returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;
use zbus::blocking::{Connection, MessageIterator};
use zbus::fdo::{RequestNameFlags, RequestNameReply};
use zbus::message::Type as MessageType;
use zbus::MatchRule;

use crate::config::RemoteConfig;
use crate::error::{PlayerError, Result};
use crate::protocol::{Command, Message};

/// Member used to wake the listener thread during shutdown.
const LISTENER_WAKE_MEMBER: &str = "ListenerShutdown";

/// Verdict of the signal filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Handled(Command),
    /// Not ours; other listeners on the bus still see the message.
    Unhandled,
}

/// Maps a received signal onto a command.
///
/// Only signals on `expected_interface` with a member from the signal table
/// are handled.
pub fn filter_signal(
    interface: Option<&str>,
    member: Option<&str>,
    expected_interface: &str,
) -> FilterResult {
    if interface != Some(expected_interface) {
        return FilterResult::Unhandled;
    }
    match member.and_then(Command::from_signal_name) {
        Some(command) => FilterResult::Handled(command),
        None => FilterResult::Unhandled,
    }
}

/// Accepts the name request only when we end up as the primary owner.
pub fn check_name_reply(reply: RequestNameReply, name: &str) -> Result<()> {
    match reply {
        RequestNameReply::PrimaryOwner | RequestNameReply::AlreadyOwner => Ok(()),
        _ => Err(PlayerError::NameNotOwned(name.to_string())),
    }
}

/// Listener for remote commands on the session bus.
pub struct RemoteServer {
    connection: Connection,
    config: RemoteConfig,
    stop: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
}

impl RemoteServer {
    /// Connects, claims the well-known name and starts forwarding commands.
    pub fn start(config: &RemoteConfig, bus_producer: Sender<Message>) -> Result<Self> {
        let connection = Connection::session()?;
        let reply = connection.request_name_with_flags(
            config.interface.as_str(),
            RequestNameFlags::ReplaceExisting.into(),
        )?;
        check_name_reply(reply, &config.interface)?;

        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .interface(config.interface.as_str())?
            .build();
        let messages = MessageIterator::for_match_rule(rule, &connection, None)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let interface = config.interface.clone();
        let listener = thread::Builder::new()
            .name("remote-listener".to_string())
            .spawn(move || Self::listen(messages, &interface, &thread_stop, &bus_producer))?;

        info!(
            "RemoteServer: listening on {} at {}",
            config.interface, config.object_path
        );
        Ok(Self {
            connection,
            config: config.clone(),
            stop,
            listener: Some(listener),
        })
    }

    fn listen(
        messages: MessageIterator,
        interface: &str,
        stop: &AtomicBool,
        bus_producer: &Sender<Message>,
    ) {
        for message in messages {
            if stop.load(Ordering::Acquire) {
                break;
            }
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    warn!("RemoteServer: failed to receive message: {}", err);
                    continue;
                }
            };

            let header = message.header();
            let iface = header.interface().map(|name| name.as_str());
            let member = header.member().map(|name| name.as_str());
            info!(
                "Got D-Bus request: {}.{} on {}",
                iface.unwrap_or("?"),
                member.unwrap_or("?"),
                header.path().map(|path| path.as_str()).unwrap_or("?")
            );

            match filter_signal(iface, member, interface) {
                FilterResult::Handled(command) => {
                    if bus_producer.send(Message::Command(command)).is_err() {
                        debug!("RemoteServer: control loop gone, stopping listener");
                        break;
                    }
                }
                FilterResult::Unhandled => {}
            }
        }
        debug!("RemoteServer: listener stopped");
    }

    /// Stops forwarding and releases the bus name.
    pub fn shutdown(mut self) {
        self.stop_listener();
    }

    fn stop_listener(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);

        if let Err(err) = self.connection.release_name(self.config.interface.as_str()) {
            warn!("RemoteServer: failed to release bus name: {}", err);
        }

        // Unicast to ourselves so the blocked iterator wakes up and sees the flag.
        let woken = match self.connection.unique_name() {
            Some(own_name) => self
                .connection
                .emit_signal(
                    Some(own_name.as_str()),
                    self.config.object_path.as_str(),
                    self.config.interface.as_str(),
                    LISTENER_WAKE_MEMBER,
                    &(),
                )
                .is_ok(),
            None => false,
        };

        if woken {
            let _ = listener.join();
        } else {
            debug!("RemoteServer: could not wake listener; leaving it detached");
        }
    }
}

impl Drop for RemoteServer {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

/// Sends one remote command signal and returns.
pub fn send_remote_command(config: &RemoteConfig, signal_name: &str) -> Result<()> {
    if Command::from_signal_name(signal_name).is_none() {
        return Err(PlayerError::UnknownSignal(signal_name.to_string()));
    }

    let connection = Connection::session()?;
    connection.emit_signal(
        None::<&str>,
        config.object_path.as_str(),
        config.interface.as_str(),
        signal_name,
        &(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SIGNAL_TABLE;

    const IFACE: &str = "com.example.MediaPlayer";

    #[test]
    fn test_filter_handles_every_signal_on_own_interface() {
        for (name, command) in SIGNAL_TABLE {
            assert_eq!(
                filter_signal(Some(IFACE), Some(name), IFACE),
                FilterResult::Handled(command)
            );
        }
    }

    #[test]
    fn test_filter_leaves_foreign_interfaces_alone() {
        assert_eq!(
            filter_signal(Some("org.freedesktop.DBus"), Some("Quit"), IFACE),
            FilterResult::Unhandled
        );
        assert_eq!(
            filter_signal(None, Some("Quit"), IFACE),
            FilterResult::Unhandled
        );
    }

    #[test]
    fn test_filter_ignores_unknown_members() {
        assert_eq!(
            filter_signal(Some(IFACE), Some(LISTENER_WAKE_MEMBER), IFACE),
            FilterResult::Unhandled
        );
        assert_eq!(
            filter_signal(Some(IFACE), None, IFACE),
            FilterResult::Unhandled
        );
    }

    #[test]
    fn test_client_rejects_unknown_signal_before_connecting() {
        let result = send_remote_command(&RemoteConfig::default(), "Rewind");
        assert!(matches!(result, Err(PlayerError::UnknownSignal(name)) if name == "Rewind"));
    }

    #[test]
    fn test_name_request_must_end_as_primary_owner() {
        assert!(check_name_reply(RequestNameReply::PrimaryOwner, IFACE).is_ok());
        assert!(check_name_reply(RequestNameReply::AlreadyOwner, IFACE).is_ok());
        for reply in [RequestNameReply::InQueue, RequestNameReply::Exists] {
            assert!(matches!(
                check_name_reply(reply, IFACE),
                Err(PlayerError::NameNotOwned(name)) if name == IFACE
            ));
        }
    }
}
