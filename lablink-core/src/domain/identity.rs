//! Device identity
//!
//! The identity is the body of every request sent to the lab server. It is
//! owned by the poll loop, mutated between requests and serialized as a flat
//! JSON object.

use serde::{Deserialize, Serialize};

use super::token::generate_token;

/// Command name sent in the `cmd` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollCommand {
    /// Long-poll while waiting to be claimed by an operator
    Register,
    /// Short-poll for the next command once claimed
    Push,
}

impl std::fmt::Display for PollCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollCommand::Register => write!(f, "register"),
            PollCommand::Push => write!(f, "push"),
        }
    }
}

/// Device metadata serialized into every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// 8-character session code
    pub token: String,
    pub brickname: String,
    pub macaddr: String,
    pub firmwarename: String,
    pub firmwareversion: String,
    pub menuversion: String,
    /// Battery voltage, formatted with three decimals
    pub battery: String,
    pub cmd: PollCommand,
    /// Exit value of the last program run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nepoexitvalue: Option<i32>,
}

impl Identity {
    /// Creates an identity with a fresh token and placeholder device fields
    pub fn new(firmwarename: impl Into<String>, menuversion: impl Into<String>) -> Self {
        Self {
            token: generate_token(),
            brickname: String::new(),
            macaddr: "00:00:00:00:00:00".to_string(),
            firmwarename: firmwarename.into(),
            firmwareversion: String::new(),
            menuversion: menuversion.into(),
            battery: format_voltage(0.0),
            cmd: PollCommand::Register,
            nepoexitvalue: None,
        }
    }

    /// Updates the fields that may change between two requests
    pub fn refresh(&mut self, brickname: impl Into<String>, battery_volts: f64) {
        self.brickname = brickname.into();
        self.battery = format_voltage(battery_volts);
    }
}

/// Formats a voltage the way the server expects it
pub fn format_voltage(volts: f64) -> String {
    format!("{:.3}", volts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::token::is_valid_token;

    #[test]
    fn test_new_identity_has_valid_token() {
        let identity = Identity::new("ev3dev", "0.1.0");
        assert!(is_valid_token(&identity.token));
        assert_eq!(identity.cmd, PollCommand::Register);
        assert!(identity.nepoexitvalue.is_none());
    }

    #[test]
    fn test_serializes_flat_map() {
        let mut identity = Identity::new("ev3dev", "0.1.0");
        identity.refresh("ev3dev-brick", 7.5);
        let value = serde_json::to_value(&identity).unwrap();

        assert_eq!(value["cmd"], "register");
        assert_eq!(value["brickname"], "ev3dev-brick");
        assert_eq!(value["battery"], "7.500");
        assert_eq!(value["firmwarename"], "ev3dev");
        assert!(value.get("nepoexitvalue").is_none());

        identity.cmd = PollCommand::Push;
        identity.nepoexitvalue = Some(143);
        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["cmd"], "push");
        assert_eq!(value["nepoexitvalue"], 143);
    }
}
