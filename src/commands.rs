use crate::garage_api::models::control::Control;
use tracing::warn;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Press the garage button. The new door state only ever arrives on the
    /// push channel.
    Door,
    Toggle(Control),
    AutoImage,
    RefreshImage,
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Option<UserCommand> {
    let word = line.trim().to_ascii_lowercase();
    let command = match word.as_str() {
        "" => return None,
        "door" | "click" => UserCommand::Door,
        "lock" => UserCommand::Toggle(Control::Lock),
        "pir" => UserCommand::Toggle(Control::MotionDetection),
        "notify" => UserCommand::Toggle(Control::Notify),
        "auto" => UserCommand::AutoImage,
        "image" => UserCommand::RefreshImage,
        "status" => UserCommand::Status,
        "quit" | "exit" => UserCommand::Quit,
        _ => {
            warn!(
                "Unknown command {:?}. Try door, lock, pir, notify, auto, image, status or quit",
                word
            );
            return None;
        }
    };
    Some(command)
}
