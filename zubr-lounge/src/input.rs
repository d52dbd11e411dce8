//! Slash-command translation for lines typed into a network.
//!
//! Used for the network's scripted startup commands as well as live user
//! input. Unknown commands are passed to the server verbatim, uppercased.

use zubr_irc::client::Command;

#[derive(Debug)]
pub enum InputAction {
    Send(Command),
    Connect,
    Disconnect(Option<String>),
    /// `None` clears the away state.
    Away(Option<String>),
    /// Nothing to send; the reason is shown to the user.
    Rejected(String),
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Translate one input line. `target` is the buffer it was typed in
/// (`None` for the lobby).
pub fn parse_input(text: &str, target: Option<&str>) -> InputAction {
    let text = text.trim_end_matches(['\r', '\n']);

    let Some(body) = text.strip_prefix('/').filter(|b| !b.starts_with('/')) else {
        // Plain text, or `//` to send a literal leading slash.
        let text = text.strip_prefix('/').unwrap_or(text);
        return match target {
            Some(target) if !text.is_empty() => InputAction::Send(Command::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            }),
            Some(_) => InputAction::Rejected("Nothing to send".into()),
            None => InputAction::Rejected("Cannot send messages to the network lobby".into()),
        };
    };

    let (cmd, args) = body.split_once(' ').unwrap_or((body, ""));
    let args = args.trim_start();
    match cmd.to_ascii_lowercase().as_str() {
        "msg" | "query" => match args.split_once(' ') {
            Some((to, msg)) if !msg.trim().is_empty() => InputAction::Send(Command::Privmsg {
                target: to.to_string(),
                text: msg.to_string(),
            }),
            _ => InputAction::Rejected("Usage: /msg <target> <message>".into()),
        },
        "join" | "j" => {
            let mut parts = args.split_whitespace();
            match parts.next() {
                Some(channel) => InputAction::Send(Command::Join {
                    channel: channel.to_string(),
                    key: parts.next().map(str::to_string),
                }),
                None => InputAction::Rejected("Usage: /join <channel> [key]".into()),
            }
        }
        "nick" => match args.split_whitespace().next() {
            Some(nick) => InputAction::Send(Command::Nick(nick.to_string())),
            None => InputAction::Rejected("Usage: /nick <nick>".into()),
        },
        "raw" | "quote" => match non_empty(args) {
            Some(line) => InputAction::Send(Command::Raw(line)),
            None => InputAction::Rejected("Usage: /raw <line>".into()),
        },
        "away" => InputAction::Away(non_empty(args)),
        "back" => InputAction::Away(None),
        "connect" | "server" => InputAction::Connect,
        "disconnect" | "quit" => InputAction::Disconnect(non_empty(args)),
        "me" => match target {
            Some(target) => InputAction::Send(Command::Privmsg {
                target: target.to_string(),
                text: format!("\x01ACTION {args}\x01"),
            }),
            None => InputAction::Rejected("Cannot send actions to the network lobby".into()),
        },
        "" => InputAction::Rejected("Empty command".into()),
        other => {
            let verb = other.to_ascii_uppercase();
            let line = if args.is_empty() { verb } else { format!("{verb} {args}") };
            InputAction::Send(Command::Raw(line))
        }
    }
}
