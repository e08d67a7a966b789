//! Server replies

use crate::dto::CommandReply;

/// Command received from the lab server in answer to a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to do, poll again
    Repeat,
    /// End the session (or, before registration, the token collided)
    Abort,
    /// A program is ready on the `download` endpoint
    Download,
    /// A runtime update is ready on the update endpoint
    Update,
    /// Anything this agent does not understand
    Unknown(String),
}

impl Reply {
    /// Maps the raw `cmd` value to a reply
    pub fn from_cmd(cmd: &str) -> Self {
        match cmd {
            "repeat" => Reply::Repeat,
            "abort" => Reply::Abort,
            "download" => Reply::Download,
            "update" => Reply::Update,
            other => Reply::Unknown(other.to_string()),
        }
    }
}

impl From<CommandReply> for Reply {
    fn from(reply: CommandReply) -> Self {
        Reply::from_cmd(&reply.cmd)
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Repeat => write!(f, "repeat"),
            Reply::Abort => write!(f, "abort"),
            Reply::Download => write!(f, "download"),
            Reply::Update => write!(f, "update"),
            Reply::Unknown(cmd) => write!(f, "unknown({})", cmd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cmd() {
        assert_eq!(Reply::from_cmd("repeat"), Reply::Repeat);
        assert_eq!(Reply::from_cmd("abort"), Reply::Abort);
        assert_eq!(Reply::from_cmd("download"), Reply::Download);
        assert_eq!(Reply::from_cmd("update"), Reply::Update);
        assert_eq!(
            Reply::from_cmd("configuration"),
            Reply::Unknown("configuration".to_string())
        );
    }

    #[test]
    fn test_from_json_body() {
        let reply: CommandReply =
            serde_json::from_str(r#"{"cmd": "download", "extra": 1}"#).unwrap();
        assert_eq!(Reply::from(reply), Reply::Download);
    }
}
