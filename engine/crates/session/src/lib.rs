use std::fmt;

use arena::{Direction, PlayerId};

/// Arrow-key escape sequences sent by raw-mode terminals.
pub const KEY_UP: &str = "\x1b[A";
pub const KEY_DOWN: &str = "\x1b[B";
pub const KEY_RIGHT: &str = "\x1b[C";
pub const KEY_LEFT: &str = "\x1b[D";
pub const KEY_PLANT: &str = "b";

/// Fixed client-facing replies.
pub mod reply {
    pub const ROOM_FULL: &str = "Room is full!";
    pub const CANT_MOVE: &str = "Can't move";
    pub const DESTROYED: &str = "You have been destroyed!";
    pub const SHUTTING_DOWN: &str = "Server is shutting down.";

    pub fn joined(room: &str) -> String {
        format!("Joined room: {}", room)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: SessionId,
    pub text: String,
    /// When true, the connection's writer closes the socket after delivering
    /// this message.
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: false,
        }
    }

    /// Create a final message that will disconnect the session after delivery.
    pub fn with_disconnect(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unjoined,
    Joined { room: String },
    /// A final message has been queued; later input is dropped.
    Closing,
}

/// A parsed input line. Commands are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `JOIN` or `JOIN <room>`.
    Join(Option<String>),
    Rooms,
    Move(Direction),
    PlantDevice,
    Other(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let command = match trimmed {
        "ROOMS" => Command::Rooms,
        "JOIN" => Command::Join(None),
        KEY_UP => Command::Move(Direction::Up),
        KEY_DOWN => Command::Move(Direction::Down),
        KEY_RIGHT => Command::Move(Direction::Right),
        KEY_LEFT => Command::Move(Direction::Left),
        KEY_PLANT => Command::PlantDevice,
        other => match other.strip_prefix("JOIN ") {
            Some(name) => {
                let name = name.trim();
                Command::Join((!name.is_empty()).then(|| name.to_string()))
            }
            None => Command::Other(other.to_string()),
        },
    };
    Some(command)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Please JOIN <room> first.")]
    NotJoined,

    #[error("Unknown command")]
    UnknownCommand,
}

/// What the service must do for a command, decided without touching any room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ListRooms,
    Join { room: Option<String> },
    Move { room: String, direction: Direction },
    PlantDevice { room: String },
    Reject(ProtocolError),
    Ignore,
}

/// Pure transition table of the session protocol.
pub fn dispatch(state: &SessionState, command: Command) -> Action {
    match (state, command) {
        (SessionState::Closing, _) => Action::Ignore,
        (_, Command::Rooms) => Action::ListRooms,
        (SessionState::Unjoined, Command::Join(room)) => Action::Join { room },
        (SessionState::Unjoined, _) => Action::Reject(ProtocolError::NotJoined),
        (SessionState::Joined { room }, Command::Move(direction)) => Action::Move {
            room: room.clone(),
            direction,
        },
        (SessionState::Joined { room }, Command::PlantDevice) => Action::PlantDevice { room: room.clone() },
        (SessionState::Joined { .. }, Command::Join(_) | Command::Other(_)) => {
            Action::Reject(ProtocolError::UnknownCommand)
        }
    }
}

/// Per-connection protocol state.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub session_id: SessionId,
    pub player: PlayerId,
    pub state: SessionState,
}

impl PlayerSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            player: PlayerId::new(session_id.to_string()),
            state: SessionState::Unjoined,
        }
    }

    /// Parse and dispatch a line against the current state. Closing
    /// sessions yield nothing.
    pub fn handle_line(&self, line: &str) -> Option<Action> {
        parse_command(line)
            .map(|command| dispatch(&self.state, command))
            .filter(|action| *action != Action::Ignore)
    }

    pub fn mark_joined(&mut self, room: impl Into<String>) {
        self.state = SessionState::Joined { room: room.into() };
    }

    /// Called when a disconnecting message has been queued for this session.
    pub fn mark_closing(&mut self) {
        self.state = SessionState::Closing;
    }

    pub fn is_closing(&self) -> bool {
        self.state == SessionState::Closing
    }

    pub fn room(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joined { room } => Some(room),
            SessionState::Unjoined | SessionState::Closing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(room: &str) -> SessionState {
        SessionState::Joined { room: room.to_string() }
    }

    #[test]
    fn parse_join_variants() {
        assert_eq!(parse_command("JOIN"), Some(Command::Join(None)));
        assert_eq!(parse_command("JOIN arena"), Some(Command::Join(Some("arena".into()))));
        assert_eq!(parse_command("  JOIN   arena  \r"), Some(Command::Join(Some("arena".into()))));
        assert_eq!(parse_command("JOIN  "), Some(Command::Join(None)));
        assert_eq!(parse_command("JOINX"), Some(Command::Other("JOINX".into())));
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert_eq!(parse_command("join"), Some(Command::Other("join".into())));
        assert_eq!(parse_command("rooms"), Some(Command::Other("rooms".into())));
        assert_eq!(parse_command("B"), Some(Command::Other("B".into())));
    }

    #[test]
    fn parse_arrow_keys_and_plant() {
        assert_eq!(parse_command("\x1b[A"), Some(Command::Move(Direction::Up)));
        assert_eq!(parse_command("\x1b[B"), Some(Command::Move(Direction::Down)));
        assert_eq!(parse_command("\x1b[C"), Some(Command::Move(Direction::Right)));
        assert_eq!(parse_command("\x1b[D"), Some(Command::Move(Direction::Left)));
        assert_eq!(parse_command("b"), Some(Command::PlantDevice));
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  \r"), None);
    }

    #[test]
    fn unjoined_transitions() {
        let state = SessionState::Unjoined;
        assert_eq!(dispatch(&state, Command::Rooms), Action::ListRooms);
        assert_eq!(
            dispatch(&state, Command::Join(Some("x".into()))),
            Action::Join { room: Some("x".into()) }
        );
        for command in [
            Command::Move(Direction::Up),
            Command::PlantDevice,
            Command::Other("hello".into()),
        ] {
            assert_eq!(dispatch(&state, command), Action::Reject(ProtocolError::NotJoined));
        }
    }

    #[test]
    fn joined_transitions() {
        let state = joined("room-1");
        assert_eq!(dispatch(&state, Command::Rooms), Action::ListRooms);
        assert_eq!(
            dispatch(&state, Command::Move(Direction::Left)),
            Action::Move { room: "room-1".into(), direction: Direction::Left }
        );
        assert_eq!(
            dispatch(&state, Command::PlantDevice),
            Action::PlantDevice { room: "room-1".into() }
        );
        assert_eq!(
            dispatch(&state, Command::Join(None)),
            Action::Reject(ProtocolError::UnknownCommand)
        );
        assert_eq!(
            dispatch(&state, Command::Other("dance".into())),
            Action::Reject(ProtocolError::UnknownCommand)
        );
    }

    #[test]
    fn protocol_errors_render_as_replies() {
        assert_eq!(ProtocolError::NotJoined.to_string(), "Please JOIN <room> first.");
        assert_eq!(ProtocolError::UnknownCommand.to_string(), "Unknown command");
    }

    #[test]
    fn player_session_lifecycle() {
        let mut session = PlayerSession::new(SessionId(7));
        assert_eq!(session.player.as_str(), "session-7");
        assert_eq!(session.room(), None);
        assert_eq!(
            session.handle_line("b"),
            Some(Action::Reject(ProtocolError::NotJoined))
        );

        session.mark_joined("room-1");
        assert_eq!(session.room(), Some("room-1"));
        assert_eq!(
            session.handle_line("b"),
            Some(Action::PlantDevice { room: "room-1".into() })
        );
        assert_eq!(session.handle_line(""), None);
    }

    #[test]
    fn closing_session_drops_all_input() {
        let state = SessionState::Closing;
        for command in [
            Command::Rooms,
            Command::Join(None),
            Command::Move(Direction::Up),
            Command::PlantDevice,
            Command::Other("x".into()),
        ] {
            assert_eq!(dispatch(&state, command), Action::Ignore);
        }

        let mut session = PlayerSession::new(SessionId(3));
        session.mark_closing();
        assert!(session.is_closing());
        assert_eq!(session.room(), None);
        assert_eq!(session.handle_line("JOIN"), None);
        assert_eq!(session.handle_line("ROOMS"), None);
    }

    #[test]
    fn session_output_disconnect_flag() {
        let out = SessionOutput::new(SessionId(1), "hi");
        assert!(!out.disconnect);
        let out = SessionOutput::with_disconnect(SessionId(1), reply::DESTROYED);
        assert!(out.disconnect);
        assert_eq!(out.text, "You have been destroyed!");
    }
}
