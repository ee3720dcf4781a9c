// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Parsing helpers for the JSON line protocol.

use serde_json;

use crate::types::ClientCommand;

/// Parse one JSON line into a ClientCommand.
pub fn parse_command(input: &str) -> Result<ClientCommand, serde_json::Error> {
    serde_json::from_str::<ClientCommand>(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientResponse;
    use spindle_core::{RunState, SpindleStateDto};

    #[test]
    fn test_parse_bare_commands() {
        assert!(matches!(
            parse_command(r#"{"cmd":"get_available_ports"}"#).unwrap(),
            ClientCommand::GetAvailablePorts
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"get_spindle_state"}"#).unwrap(),
            ClientCommand::GetSpindleState
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"start_spindle"}"#).unwrap(),
            ClientCommand::StartSpindle
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"emergency_stop"}"#).unwrap(),
            ClientCommand::EmergencyStop
        ));
        assert!(matches!(
            parse_command(r#"{"cmd":"reset_spindle"}"#).unwrap(),
            ClientCommand::ResetSpindle
        ));
    }

    #[test]
    fn test_parse_commands_with_params() {
        match parse_command(r#"{"cmd":"set_port","path":"/dev/ttyACM0"}"#).unwrap() {
            ClientCommand::SetPort { path } => assert_eq!(path, "/dev/ttyACM0"),
            other => panic!("expected SetPort, got {other:?}"),
        }

        match parse_command(r#"{"cmd":"set_spindle_target","direction":true,"speed":1200}"#).unwrap()
        {
            ClientCommand::SetSpindleTarget { direction, speed } => {
                assert!(direction);
                assert_eq!(speed, 1200);
            }
            other => panic!("expected SetSpindleTarget, got {other:?}"),
        }

        match parse_command(r#"{"cmd":"set_max_spindle_speed","speed":2000}"#).unwrap() {
            ClientCommand::SetMaxSpindleSpeed { speed } => assert_eq!(speed, 2000),
            other => panic!("expected SetMaxSpindleSpeed, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert!(parse_command("not valid json").is_err());
        assert!(parse_command(r#"{"cmd":"unknown_command"}"#).is_err());
        // Missing required parameter.
        assert!(parse_command(r#"{"cmd":"set_port"}"#).is_err());
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let json = serde_json::to_string(&ClientResponse::ok()).unwrap();
        assert_eq!(json, r#"{"success":true}"#);

        let json = serde_json::to_string(&ClientResponse::failure("bad")).unwrap();
        assert!(json.contains(r#""success":false"#));
        assert!(json.contains(r#""error":"bad""#));
        assert!(!json.contains("state"));
        assert!(!json.contains("ports"));
    }

    #[test]
    fn test_response_state_uses_original_panel_shape() {
        let resp = ClientResponse {
            success: true,
            state: Some(SpindleStateDto {
                state: RunState::EmergencyStop,
                direction: false,
                target_speed: 1000,
                speed: 0,
                power: 0,
            }),
            ..ClientResponse::default()
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""State":"EmergencyStop""#));
        assert!(json.contains(r#""TargetSpeed":1000"#));
    }

    #[test]
    fn test_response_round_trips() {
        let resp = ClientResponse {
            success: true,
            ports: Some(vec!["/dev/ttyACM0".into(), "/dev/ttyACM1".into()]),
            max_speed: Some(1500),
            ..ClientResponse::default()
        };
        let json = serde_json::to_string(&resp).unwrap();
        let decoded: ClientResponse = serde_json::from_str(&json).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.max_speed, Some(1500));
        assert_eq!(decoded.ports.as_deref().map(<[String]>::len), Some(2));
    }
}
