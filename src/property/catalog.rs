//! The full container property catalog (spec §6).

use std::collections::HashMap;

use crate::container::{Container, State};
use crate::error::{DaemonError, ErrorCode};
use crate::property::registry::{Descriptor, Flags};
use crate::property::value::{Kind, Value};

const CONFIGURABLE: &[State] = &[State::Stopped, State::Dead];
const ANYTIME: &[State] = &[State::Stopped, State::Starting, State::Running, State::Paused, State::Meta, State::Dead];

fn invalid(msg: impl Into<String>) -> DaemonError {
    DaemonError::new(ErrorCode::InvalidValue, msg)
}

fn parse_bool(raw: &str) -> Result<Value, DaemonError> {
    match raw {
        "true" | "1" => Ok(Value::Bool(true)),
        "false" | "0" => Ok(Value::Bool(false)),
        other => Err(invalid(format!("not a boolean: {}", other))),
    }
}

fn parse_uint(raw: &str) -> Result<Value, DaemonError> {
    raw.parse::<u64>().map(Value::UInt).map_err(|_| invalid(format!("not an unsigned integer: {}", raw)))
}

fn parse_string(raw: &str) -> Result<Value, DaemonError> {
    Ok(Value::String(raw.to_string()))
}

fn parse_env(raw: &str) -> Result<Value, DaemonError> {
    let mut map = HashMap::new();
    for pair in raw.split(';').filter(|s| !s.is_empty()) {
        let (k, v) = pair.split_once('=').ok_or_else(|| invalid(format!("malformed env entry: {}", pair)))?;
        map.insert(k.to_string(), v.to_string());
    }
    Ok(Value::Map(map))
}

fn parse_list_semicolon(raw: &str) -> Result<Value, DaemonError> {
    Ok(Value::List(raw.split(';').filter(|s| !s.is_empty()).map(str::to_string).collect()))
}

fn parse_command(raw: &str) -> Result<Value, DaemonError> {
    shell_words::split(raw).map_err(|e| invalid(format!("unparsable command: {}", e)))?;
    Ok(Value::String(raw.to_string()))
}

fn parse_cpu_policy(raw: &str) -> Result<Value, DaemonError> {
    match raw {
        "normal" | "rt" => Ok(Value::String(raw.to_string())),
        // Open Question (spec §9): source returns NotSupported for idle;
        // left unresolved deliberately, don't guess at real semantics.
        "idle" => Err(DaemonError::new(ErrorCode::NotSupported, "cpu_policy=idle is not supported")),
        other => Err(invalid(format!("unknown cpu_policy: {}", other))),
    }
}

fn parse_range(raw: &str, lo: i64, hi: i64) -> Result<Value, DaemonError> {
    let v: i64 = raw.parse().map_err(|_| invalid(format!("not an integer: {}", raw)))?;
    if v < lo || v > hi {
        return Err(invalid(format!("{} out of range [{},{}]", v, lo, hi)));
    }
    Ok(Value::Int(v))
}

fn parse_cpu_priority(raw: &str) -> Result<Value, DaemonError> {
    parse_range(raw, 0, 99)
}

fn parse_net_priority(raw: &str) -> Result<Value, DaemonError> {
    parse_range(raw, 0, 7)
}

/// `name:soft hard[;name:soft hard]*`, `unlim` for infinity (spec §6
/// "Ulimit grammar").
fn parse_ulimit(raw: &str) -> Result<Value, DaemonError> {
    const NAMES: &[&str] = &[
        "as", "core", "cpu", "data", "fsize", "locks", "memlock", "msgqueue", "nice", "nofile",
        "nproc", "rss", "rtprio", "rttime", "sigpending", "stack",
    ];
    for entry in raw.split(';').filter(|s| !s.is_empty()) {
        let (name, limits) = entry.split_once(':').ok_or_else(|| invalid(format!("malformed ulimit: {}", entry)))?;
        if !NAMES.contains(&name) {
            return Err(invalid(format!("unknown ulimit resource: {}", name)));
        }
        let mut parts = limits.split_whitespace();
        let soft = parts.next().ok_or_else(|| invalid("missing soft limit"))?;
        let hard = parts.next().ok_or_else(|| invalid("missing hard limit"))?;
        for v in [soft, hard] {
            if v != "unlim" && v.parse::<u64>().is_err() {
                return Err(invalid(format!("bad ulimit value: {}", v)));
            }
        }
    }
    Ok(Value::String(raw.to_string()))
}

/// `src dst[ ro|rw][;...]`, `src` must exist (spec §6 "Bind grammar").
fn parse_bind(raw: &str) -> Result<Value, DaemonError> {
    for entry in raw.split(';').filter(|s| !s.is_empty()) {
        let mut parts = entry.split_whitespace();
        let src = parts.next().ok_or_else(|| invalid("missing bind source"))?;
        parts.next().ok_or_else(|| invalid("missing bind destination"))?;
        if let Some(mode) = parts.next() {
            if mode != "ro" && mode != "rw" {
                return Err(invalid(format!("bad bind mode: {}", mode)));
            }
        }
        if !std::path::Path::new(src).exists() {
            return Err(invalid(format!("bind source does not exist: {}", src)));
        }
    }
    Ok(Value::String(raw.to_string()))
}

/// `none` | `host [iface]` | `macvlan master name [mode [hw]]` |
/// combinations separated by `;` (spec §6 "Net grammar").
fn parse_net(raw: &str) -> Result<Value, DaemonError> {
    if raw == "none" {
        return Ok(Value::String(raw.to_string()));
    }
    for entry in raw.split(';').filter(|s| !s.is_empty()) {
        if entry == "none" {
            return Err(invalid("'none' must be exclusive"));
        }
        let mut parts = entry.split_whitespace();
        match parts.next() {
            Some("host") => {}
            Some("macvlan") => {
                if parts.next() != Some("master") {
                    return Err(invalid("macvlan entry missing 'master'"));
                }
                parts.next().ok_or_else(|| invalid("macvlan entry missing interface name"))?;
                if let Some(mode) = parts.next() {
                    if !["bridge", "private", "vepa", "passthru"].contains(&mode) {
                        return Err(invalid(format!("unknown macvlan mode: {}", mode)));
                    }
                }
            }
            other => return Err(invalid(format!("unknown net entry: {:?}", other))),
        }
    }
    Ok(Value::String(raw.to_string()))
}

pub fn catalog() -> Vec<Descriptor> {
    vec![
        Descriptor {
            name: "command",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::String(String::new()),
            validator: parse_command,
        },
        Descriptor {
            name: "user",
            kind: Kind::String,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |c| Value::String(c.access.owner_uid.to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "group",
            kind: Kind::String,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |c| Value::String(c.access.owner_gid.to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "env",
            kind: Kind::Map,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Map(HashMap::new()),
            validator: parse_env,
        },
        Descriptor {
            name: "root",
            kind: Kind::String,
            flags: Flags { read_only_if_has_parent: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::String("/".to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "cwd",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::String("/".to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "stdin_path",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::String("/dev/null".to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "stdout_path",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::String("stdout".to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "stderr_path",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::String("stderr".to_string()),
            validator: parse_string,
        },
        Descriptor {
            name: "stdout_limit",
            kind: Kind::UInt,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::UInt(8 * 1024 * 1024),
            validator: parse_uint,
        },
        Descriptor {
            name: "memory_guarantee",
            kind: Kind::UInt,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: ANYTIME,
            default: |_| Value::UInt(0),
            validator: parse_uint,
        },
        Descriptor {
            name: "memory_limit",
            kind: Kind::UInt,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: ANYTIME,
            default: |_| Value::UInt(0),
            validator: parse_uint,
        },
        Descriptor {
            name: "recharge_on_pgfault",
            kind: Kind::Bool,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Bool(false),
            validator: parse_bool,
        },
        Descriptor {
            name: "cpu_policy",
            kind: Kind::String,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::String("normal".to_string()),
            validator: parse_cpu_policy,
        },
        Descriptor {
            name: "cpu_priority",
            kind: Kind::Int,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Int(50),
            validator: parse_cpu_priority,
        },
        Descriptor {
            name: "net_guarantee",
            kind: Kind::UInt,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: ANYTIME,
            default: |_| Value::UInt(0),
            validator: parse_uint,
        },
        Descriptor {
            name: "net_ceil",
            kind: Kind::UInt,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: ANYTIME,
            default: |_| Value::UInt(0),
            validator: parse_uint,
        },
        Descriptor {
            name: "net_priority",
            kind: Kind::Int,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Int(3),
            validator: parse_net_priority,
        },
        Descriptor {
            name: "respawn",
            kind: Kind::Bool,
            flags: Flags::default(),
            valid_states: ANYTIME,
            default: |_| Value::Bool(false),
            validator: parse_bool,
        },
        Descriptor {
            name: "max_respawns",
            kind: Kind::Int,
            flags: Flags::default(),
            valid_states: ANYTIME,
            default: |_| Value::Int(-1),
            validator: |raw| raw.parse::<i64>().map(Value::Int).map_err(|_| invalid("not an integer")),
        },
        Descriptor {
            name: "isolate",
            kind: Kind::Bool,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Bool(true),
            validator: parse_bool,
        },
        Descriptor {
            name: "private",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: ANYTIME,
            default: |_| Value::String(String::new()),
            validator: parse_string,
        },
        Descriptor {
            name: "ulimit",
            kind: Kind::String,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::String(String::new()),
            validator: parse_ulimit,
        },
        Descriptor {
            name: "hostname",
            kind: Kind::String,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |c| Value::String(c.name.trim_start_matches('/').replace('/', "-")),
            validator: parse_string,
        },
        Descriptor {
            name: "bind_dns",
            kind: Kind::Bool,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::Bool(true),
            validator: parse_bool,
        },
        Descriptor {
            name: "bind",
            kind: Kind::List,
            flags: Flags::default(),
            valid_states: CONFIGURABLE,
            default: |_| Value::List(Vec::new()),
            validator: parse_bind,
        },
        Descriptor {
            name: "net",
            kind: Kind::String,
            flags: Flags { inherited: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::String("host".to_string()),
            validator: parse_net,
        },
        Descriptor {
            name: "allowed_devices",
            kind: Kind::List,
            flags: Flags { inherited: true, superuser_only: true, ..Default::default() },
            valid_states: CONFIGURABLE,
            default: |_| Value::List(Vec::new()),
            validator: parse_list_semicolon,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_policy_idle_is_not_supported() {
        let err = parse_cpu_policy("idle").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[test]
    fn ulimit_rejects_unknown_resource() {
        assert!(parse_ulimit("bogus:10 20").is_err());
    }

    #[test]
    fn ulimit_accepts_unlim() {
        assert!(parse_ulimit("nofile:1024 unlim").is_ok());
    }

    #[test]
    fn net_none_must_be_exclusive() {
        assert!(parse_net("none;host").is_err());
        assert!(parse_net("none").is_ok());
        assert!(parse_net("host;macvlan master eth0 bridge").is_ok());
    }

    #[test]
    fn bind_requires_existing_source() {
        assert!(parse_bind("/definitely/not/a/real/path /dst rw").is_err());
    }
}
