//! The Active-mode client command grammar (spec §4.1).

/// A parsed client frame. `None` from [`parse`] means the frame is
/// malformed in a way the protocol defines as silently ignored (an `@`
/// command missing its payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Direct { target_user: String, target_site: Option<String>, payload: String },
    File { target_user: String, target_site: String, filename: String, ciphertext: String },
    FileInvalid,
    Broadcast(String),
}

/// Parse one client-to-server text frame per the Active-mode grammar.
pub fn parse(frame: &str) -> Option<Command> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("exit") {
        return Some(Command::Exit);
    }
    if let Some(rest) = trimmed.strip_prefix('@') {
        return parse_direct(rest);
    }
    if let Some(rest) = trimmed.strip_prefix("FILE ") {
        return Some(parse_file(rest));
    }
    Some(Command::Broadcast(trimmed.to_string()))
}

fn parse_direct(rest: &str) -> Option<Command> {
    let mut parts = rest.splitn(2, ' ');
    let target = parts.next().unwrap_or("");
    let payload = parts.next()?;
    if target.is_empty() || payload.is_empty() {
        return None;
    }
    let command = match target.split_once('@') {
        Some((user, site)) => Command::Direct {
            target_user: user.to_string(),
            target_site: Some(site.to_string()),
            payload: payload.to_string(),
        },
        None => Command::Direct { target_user: target.to_string(), target_site: None, payload: payload.to_string() },
    };
    Some(command)
}

fn parse_file(rest: &str) -> Command {
    let parts: Vec<&str> = rest.splitn(3, ' ').collect();
    if parts.len() < 3 {
        return Command::FileInvalid;
    }
    let (target, filename, ciphertext) = (parts[0], parts[1], parts[2]);
    match target.split_once('@') {
        Some((user, site)) if !user.is_empty() && !site.is_empty() => Command::File {
            target_user: user.to_string(),
            target_site: site.to_string(),
            filename: filename.to_string(),
            ciphertext: ciphertext.to_string(),
        },
        _ => Command::FileInvalid,
    }
}
