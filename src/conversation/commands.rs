//! The closed set of bot commands.

use serde::{Deserialize, Serialize};

use crate::transport::CommandInfo;

/// Commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Help,
    Start,
    GiveAddress,
    AddAddress,
    AddSecondaryHandle,
    AddWishes,
    AddName,
    MyData,
}

impl Command {
    /// Every command, in registration order.
    pub const ALL: [Command; 8] = [
        Command::Help,
        Command::Start,
        Command::GiveAddress,
        Command::AddAddress,
        Command::AddSecondaryHandle,
        Command::AddWishes,
        Command::AddName,
        Command::MyData,
    ];

    /// Name as typed after `/`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Start => "start",
            Self::GiveAddress => "give_me_some",
            Self::AddAddress => "add_address",
            Self::AddSecondaryHandle => "add_instagram",
            Self::AddWishes => "add_wishes",
            Self::AddName => "add_name",
            Self::MyData => "my_data",
        }
    }

    /// Description shown in the transport's command menu.
    pub fn description(self) -> &'static str {
        match self {
            Self::Help | Self::Start => "Что почём",
            Self::GiveAddress => "Взять адрес",
            Self::AddAddress => "Добавить адрес",
            Self::AddSecondaryHandle => "Добавить Instagram",
            Self::AddWishes => "Добавить пожелания",
            Self::AddName => "Добавить ФИО",
            Self::MyData => "Посмотреть свои данные",
        }
    }

    /// Parse `name`, `/name` or `/name@botname`.
    pub fn from_name(raw: &str) -> Option<Self> {
        let name = raw.trim().trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    /// Whether invoking the command may leave the chat waiting for input.
    pub fn expects_follow_up(self) -> bool {
        matches!(
            self,
            Self::GiveAddress
                | Self::AddAddress
                | Self::AddSecondaryHandle
                | Self::AddWishes
                | Self::AddName
        )
    }

    /// Whether the command reads or writes the sender's own record.
    pub fn needs_handle(self) -> bool {
        !matches!(self, Self::Help | Self::Start)
    }

    /// Menu entries for every command.
    pub fn catalog() -> Vec<CommandInfo> {
        Self::ALL
            .into_iter()
            .map(|cmd| CommandInfo {
                name: cmd.name().to_owned(),
                description: cmd.description().to_owned(),
            })
            .collect()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_name(cmd.name()), Some(cmd));
            assert_eq!(Command::from_name(&format!("/{cmd}")), Some(cmd));
        }
    }

    #[test]
    fn bot_suffix_is_ignored() {
        assert_eq!(
            Command::from_name("/give_me_some@post_bot"),
            Some(Command::GiveAddress)
        );
        assert_eq!(Command::from_name("/nope"), None);
        assert_eq!(Command::from_name(""), None);
    }

    #[test]
    fn catalog_lists_every_command() {
        let catalog = Command::catalog();
        assert_eq!(catalog.len(), Command::ALL.len());
        assert_eq!(catalog[2].name, "give_me_some");
        assert_eq!(catalog[2].description, "Взять адрес");
    }

    #[test]
    fn single_turn_commands() {
        assert!(!Command::MyData.expects_follow_up());
        assert!(!Command::Help.expects_follow_up());
        assert!(Command::AddName.expects_follow_up());
        assert!(!Command::Start.needs_handle());
    }
}
