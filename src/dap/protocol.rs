use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::DebuggerConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct DapMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub content: DapMessageContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DapMessageContent {
    Request {
        command: String,
        arguments: Option<Value>,
    },
    Response {
        request_seq: u64,
        success: bool,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Event {
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    /// The assembled program or app to load.
    pub program: PathBuf,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub config: Option<DebuggerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: usize,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub hit_condition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize_with_arguments() {
        let msg: DapMessage = serde_json::from_str(
            r#"{"seq":3,"type":"request","command":"launch","arguments":{"program":"game.8xk","stopOnEntry":true}}"#,
        )
        .unwrap();
        match msg.content {
            DapMessageContent::Request { command, arguments } => {
                assert_eq!(command, "launch");
                let args: LaunchArguments = serde_json::from_value(arguments.unwrap()).unwrap();
                assert_eq!(args.program, PathBuf::from("game.8xk"));
                assert!(args.stop_on_entry);
                assert!(args.config.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn source_breakpoints_default_their_conditions() {
        let args: SetBreakpointsArguments = serde_json::from_str(
            r#"{"source":{"path":"main.z80"},"breakpoints":[{"line":4},{"line":9,"hitCondition":">=2"}]}"#,
        )
        .unwrap();
        assert_eq!(args.breakpoints.len(), 2);
        assert!(args.breakpoints[0].condition.is_none());
        assert_eq!(args.breakpoints[1].hit_condition.as_deref(), Some(">=2"));
    }
}
