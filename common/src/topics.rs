pub const BASE_TOPIC: &str = "hcy/airco";

pub const TOPIC_STATUS_FILTER: &str = "hcy/airco/+/status";
pub const TOPIC_COMMAND_FILTER: &str = "hcy/airco/+/command/+";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Power,
    Mode,
    FanMode,
    SwingMode,
    Temperature,
    Status,
}

impl CommandKind {
    pub const ALL: [Self; 6] = [
        Self::Power,
        Self::Mode,
        Self::FanMode,
        Self::SwingMode,
        Self::Temperature,
        Self::Status,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Power => "command/power",
            Self::Mode => "command/mode",
            Self::FanMode => "command/fan_mode",
            Self::SwingMode => "command/swing_mode",
            Self::Temperature => "command/temperature",
            Self::Status => "status",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }
}

/// Protocol ids come from configuration, so no escaping is applied.
pub fn encode_topic(protocol_id: &str, kind: CommandKind) -> String {
    format!("{BASE_TOPIC}/{protocol_id}/{}", kind.suffix())
}

pub fn status_topic(protocol_id: &str) -> String {
    encode_topic(protocol_id, CommandKind::Status)
}

/// Splits `<base>/<protocol_id>/<kind>` back into its parts.
pub fn parse_topic(topic: &str) -> Option<(&str, CommandKind)> {
    let rest = topic.strip_prefix(BASE_TOPIC)?.strip_prefix('/')?;
    let (protocol_id, suffix) = rest.split_once('/')?;
    if protocol_id.is_empty() {
        return None;
    }
    let kind = CommandKind::from_suffix(suffix)?;
    Some((protocol_id, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_command_topic() {
        assert_eq!(
            encode_topic("ac_ehbo", CommandKind::Mode),
            "hcy/airco/ac_ehbo/command/mode"
        );
        assert_eq!(status_topic("ac_ehbo"), "hcy/airco/ac_ehbo/status");
    }

    #[test]
    fn parses_every_kind_back() {
        for kind in CommandKind::ALL {
            let topic = encode_topic("ac_bestuurskamer", kind);
            assert_eq!(parse_topic(&topic), Some(("ac_bestuurskamer", kind)));
        }
    }

    #[test]
    fn rejects_foreign_topics() {
        assert_eq!(parse_topic("office/lights/state"), None);
        assert_eq!(parse_topic("hcy/airco"), None);
        assert_eq!(parse_topic("hcy/airco//status"), None);
        assert_eq!(parse_topic("hcy/airco/ac_ehbo/command/volume"), None);
        assert_eq!(parse_topic("hcy/aircondition/ac_ehbo/status"), None);
    }
}
