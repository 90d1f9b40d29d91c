//! Human-readable error descriptions and structured JSON error formatting.

use lockstep_core::error::{BuildError, CommandError, HandshakeError, SyncError};

fn describe_sync(e: &SyncError) -> String {
    match e {
        SyncError::Timeout => "What happened: The microcontroller did not answer within the bus timeout.\nLikely causes: Peer not powered, wrong I2C address, or bus.timeout_ms too low.\nHow to fix: Check wiring and [bus] in the config; `i2cdetect -y 1` should list the peer address.".to_string(),
        SyncError::MalformedFrame(m) => format!(
            "What happened: The peer answered with a malformed frame ({m}).\nLikely causes: Firmware speaks a different frame layout, or bus noise.\nHow to fix: Flash the matching firmware and check pull-ups on SDA/SCL."
        ),
        other => format!(
            "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid controller parameters ({msg}).\nLikely causes: Out-of-range values in [control].\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(he) = err.downcast_ref::<HandshakeError>() {
        return match he {
            HandshakeError::Desync { sent, received, status } => format!(
                "What happened: Protocol desync (sent token {sent:X}, peer answered {received:X} with {status}).\nLikely causes: A lost or repeated frame, or another master on the bus.\nHow to fix: Check the bus wiring, then re-arm with `start`."
            ),
            HandshakeError::Transport(se) => describe_sync(se),
            other => format!(
                "What happened: {other}.\nLikely causes: The handshake was not armed.\nHow to fix: Send `start` before expecting exchanges."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SyncError>() {
        return describe_sync(se);
    }

    if let Some(CommandError::Rejected(msg)) = err.downcast_ref::<CommandError>() {
        return format!(
            "What happened: Command rejected ({msg}).\nHow to fix: Check the value; previous settings are still in effect."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("open i2c") || lower.contains("open motor driver") || lower.contains("open tick pin") {
        return format!(
            "What happened: Failed to initialize hardware.\nLikely causes: I2C not enabled, wrong bus/address/pin numbers, or insufficient permissions ({msg}).\nHow to fix: Enable I2C, fix [bus]/[motor_driver]/[pins] in the config, and make sure the user is in the i2c and gpio groups."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidConfig";
    }
    if let Some(he) = err.downcast_ref::<HandshakeError>() {
        return match he {
            HandshakeError::Desync { .. } => "ProtocolDesync",
            HandshakeError::Transport(SyncError::Timeout) => "Timeout",
            HandshakeError::Transport(_) => "Transport",
            HandshakeError::Idle | HandshakeError::Latched => "Handshake",
        };
    }
    if let Some(se) = err.downcast_ref::<SyncError>() {
        return match se {
            SyncError::Timeout => "Timeout",
            _ => "Hardware",
        };
    }
    if err.downcast_ref::<CommandError>().is_some() {
        return "CommandRejected";
    }
    let lower = format!("{err:#}").to_ascii_lowercase();
    if lower.contains("invalid configuration") || lower.contains("parse config") || lower.contains("read config") {
        return "InvalidConfig";
    }
    "Error"
}

/// Exit codes: 2 configuration, 3 protocol, 4 hardware/timeout, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match reason_name(err) {
        "InvalidConfig" | "CommandRejected" => 2,
        "ProtocolDesync" | "Handshake" => 3,
        "Timeout" | "Transport" | "Hardware" => 4,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    if let Some(HandshakeError::Desync { sent, received, status }) =
        err.downcast_ref::<HandshakeError>()
    {
        return json!({
            "reason": reason_name(err),
            "details": { "sent": format!("{sent:X}"), "received": format!("{received:X}"), "status": status.to_string() },
            "message": humanize(err),
        })
        .to_string();
    }
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
