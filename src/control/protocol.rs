// src/control/protocol.rs

//! Line-based control protocol.
//!
//! Request: a single line, one of
//! `status [NAME]`, `start NAME`, `stop NAME [TIMEOUT]`, `restart NAME`.
//!
//! Response: the numeric exit code on the first line, followed by free-form
//! text lines, terminated by EOF.

use std::fmt;
use std::time::Duration;

use crate::errors::{ProcwatchError, exit_code};
use crate::supervisor::UnitStatus;
use crate::types::parse_duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// `None` lists every unit.
    Status(Option<String>),
    Start(String),
    Stop {
        name: String,
        timeout: Option<Duration>,
    },
    Restart(String),
}

impl ControlRequest {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| "empty request".to_string())?;
        let name = words.next().map(str::to_string);
        let extra = words.next();

        let req = match (verb, name, extra) {
            ("status", name, None) => ControlRequest::Status(name),
            ("start", Some(name), None) => ControlRequest::Start(name),
            ("restart", Some(name), None) => ControlRequest::Restart(name),
            ("stop", Some(name), timeout) => ControlRequest::Stop {
                name,
                timeout: timeout.map(parse_duration).transpose()?,
            },
            ("start" | "stop" | "restart", None, _) => {
                return Err(format!("`{verb}` needs a unit name"));
            }
            _ => return Err(format!("malformed request: {line:?}")),
        };

        if words.next().is_some() {
            return Err(format!("malformed request: {line:?}"));
        }
        Ok(req)
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRequest::Status(None) => f.write_str("status"),
            ControlRequest::Status(Some(name)) => write!(f, "status {name}"),
            ControlRequest::Start(name) => write!(f, "start {name}"),
            ControlRequest::Stop {
                name,
                timeout: None,
            } => write!(f, "stop {name}"),
            ControlRequest::Stop {
                name,
                timeout: Some(timeout),
            } => write!(f, "stop {name} {}ms", timeout.as_millis()),
            ControlRequest::Restart(name) => write!(f, "restart {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub code: i32,
    pub lines: Vec<String>,
}

impl ControlResponse {
    pub fn ok(lines: Vec<String>) -> Self {
        Self {
            code: exit_code::SUCCESS,
            lines,
        }
    }

    pub fn error(err: &ProcwatchError) -> Self {
        Self {
            code: err.exit_code(),
            lines: vec![err.to_string()],
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            code: exit_code::CONTROL_ERROR,
            lines: vec![message.into()],
        }
    }

    pub fn from_result(result: crate::errors::Result<UnitStatus>) -> Self {
        match result {
            Ok(status) => Self::ok(vec![status.to_string()]),
            Err(err) => Self::error(&err),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = format!("{}\n", self.code);
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, String> {
        let mut lines = text.lines();
        let code = lines
            .next()
            .ok_or_else(|| "empty response".to_string())?
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid response code: {e}"))?;
        Ok(Self {
            code,
            lines: lines.map(str::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        assert_eq!(ControlRequest::parse("status"), Ok(ControlRequest::Status(None)));
        assert_eq!(
            ControlRequest::parse("status svc\n"),
            Ok(ControlRequest::Status(Some("svc".into())))
        );
        assert_eq!(ControlRequest::parse("start svc"), Ok(ControlRequest::Start("svc".into())));
        assert_eq!(
            ControlRequest::parse("restart svc"),
            Ok(ControlRequest::Restart("svc".into()))
        );
        assert_eq!(
            ControlRequest::parse("stop svc 2s"),
            Ok(ControlRequest::Stop {
                name: "svc".into(),
                timeout: Some(Duration::from_secs(2)),
            })
        );
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(ControlRequest::parse("").is_err());
        assert!(ControlRequest::parse("start").is_err());
        assert!(ControlRequest::parse("reload svc").is_err());
        assert!(ControlRequest::parse("start a b").is_err());
        assert!(ControlRequest::parse("stop svc soon").is_err());
    }

    #[test]
    fn stop_timeout_survives_the_wire() {
        let req = ControlRequest::Stop {
            name: "svc".into(),
            timeout: Some(Duration::from_millis(1500)),
        };
        assert_eq!(ControlRequest::parse(&req.to_string()), Ok(req));
    }

    #[test]
    fn response_encoding_puts_code_first() {
        let resp = ControlResponse {
            code: 3,
            lines: vec!["svc stopped".into()],
        };
        assert_eq!(resp.encode(), "3\nsvc stopped\n");
        assert_eq!(ControlResponse::decode(&resp.encode()), Ok(resp));
        assert!(ControlResponse::decode("").is_err());
        assert!(ControlResponse::decode("ok\n").is_err());
    }
}
