//! Lines typed into the chat input: either a message or a settings command.

use sitefeed_widgets::{color::is_known_color, prefs::SettingsUpdate};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InputAction {
    Send(String),
    Settings(SettingsUpdate),
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command /{0}")]
    Unknown(String),
    #[error("/{0} needs a value")]
    MissingValue(&'static str),
    #[error("{0:?} is not a #hex or hsl() color")]
    BadColor(String),
    #[error("/wingdings takes on or off, not {0:?}")]
    BadSwitch(String),
}

/// Parses an input line. Anything not starting with `/` is a message; `//` escapes a leading
/// slash.
pub fn parse_input(line: &str) -> Result<InputAction, CommandError> {
    let Some(command) = line.trim_start().strip_prefix('/') else {
        return Ok(InputAction::Send(line.to_owned()));
    };
    if command.starts_with('/') {
        return Ok(InputAction::Send(command.to_owned()));
    }
    let (name, value) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, value)| (name, value.trim()));
    let update = match name {
        "name" => {
            if value.is_empty() {
                return Err(CommandError::MissingValue("name"));
            }
            SettingsUpdate {
                name: Some(value.to_owned()),
                ..Default::default()
            }
        }
        "color" => {
            if value.is_empty() {
                return Err(CommandError::MissingValue("color"));
            }
            if !is_known_color(value) {
                return Err(CommandError::BadColor(value.to_owned()));
            }
            SettingsUpdate {
                color: Some(value.to_owned()),
                ..Default::default()
            }
        }
        "wingdings" => {
            let wingdings = match value {
                "on" => true,
                "off" => false,
                "" => return Err(CommandError::MissingValue("wingdings")),
                other => return Err(CommandError::BadSwitch(other.to_owned())),
            };
            SettingsUpdate {
                wingdings: Some(wingdings),
                ..Default::default()
            }
        }
        other => return Err(CommandError::Unknown(other.to_owned())),
    };
    Ok(InputAction::Settings(update))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(
            parse_input("hello world"),
            Ok(InputAction::Send("hello world".to_owned()))
        );
        assert_eq!(
            parse_input("//shrug"),
            Ok(InputAction::Send("/shrug".to_owned()))
        );
    }

    #[test]
    fn settings_commands() {
        assert_eq!(
            parse_input("/name  dana "),
            Ok(InputAction::Settings(SettingsUpdate {
                name: Some("dana".to_owned()),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_input("/color hsl(10, 50%, 50%)"),
            Ok(InputAction::Settings(SettingsUpdate {
                color: Some("hsl(10, 50%, 50%)".to_owned()),
                ..Default::default()
            }))
        );
        assert_eq!(
            parse_input("/wingdings off"),
            Ok(InputAction::Settings(SettingsUpdate {
                wingdings: Some(false),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn bad_commands_are_reported() {
        assert_eq!(parse_input("/nick x"), Err(CommandError::Unknown("nick".to_owned())));
        assert_eq!(parse_input("/name"), Err(CommandError::MissingValue("name")));
        assert_eq!(
            parse_input("/color red"),
            Err(CommandError::BadColor("red".to_owned()))
        );
        assert_eq!(
            parse_input("/wingdings maybe"),
            Err(CommandError::BadSwitch("maybe".to_owned()))
        );
    }
}
