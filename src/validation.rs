//! Input validation shared by the ingest and read routes.

/// Colons are key separators in the store, so project names must not
/// contain them; keep the charset tight enough that prefix scans can never
/// cross projects.
pub fn validate_project(project: &str) -> Result<(), &'static str> {
    if project.is_empty() || project.len() > 64 {
        return Err("project must be between 1 and 64 characters");
    }
    if !project
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err("project may only contain letters, digits, underscores, hyphens and dots");
    }
    Ok(())
}

pub fn validate_error_kind(kind: &str) -> Result<(), &'static str> {
    if kind.trim().is_empty() {
        return Err("error kind is required");
    }
    if kind.len() > 200 {
        return Err("error kind must not exceed 200 characters");
    }
    Ok(())
}

/// Targets are transaction names like "GET /orders/:id"; they appear in
/// store keys but are always scanned with a full prefix, so any printable
/// text short of the cap is fine.
pub fn validate_target(target: &str) -> Result<(), &'static str> {
    if target.trim().is_empty() {
        return Err("target is required");
    }
    if target.len() > 300 {
        return Err("target must not exceed 300 characters");
    }
    if target.chars().any(|c| c.is_control()) {
        return Err("target must not contain control characters");
    }
    Ok(())
}

pub fn validate_duration_ms(duration_ms: f64) -> Result<(), &'static str> {
    if !duration_ms.is_finite() || duration_ms < 0.0 {
        return Err("duration must be a non-negative number");
    }
    Ok(())
}

pub const MAX_MESSAGE_LEN: usize = 4096;
pub const MAX_FRAMES: usize = 128;
pub const MAX_QUERIES_PER_EVENT: usize = 500;
pub const MAX_BATCH_ITEMS: usize = 100;

/// Oversized messages are truncated rather than rejected; losing the tail
/// of a message is better than dropping the event.
pub fn clamp_message(message: &str) -> String {
    if message.len() <= MAX_MESSAGE_LEN {
        return message.to_string();
    }
    let mut end = MAX_MESSAGE_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
