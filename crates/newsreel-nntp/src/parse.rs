//! Text-level parsing of NNTP responses.
//!
//! Nothing here performs I/O; the connection layer hands lines in and gets
//! typed values (or [`NntpError::Protocol`]) back.

use crate::error::NntpError;
use crate::model::{Expect, Group, NntpResponse, PostingStatus};

/// Parse `<3 digits>[ <text>]` ([RFC 3977 §3.2](https://datatracker.ietf.org/doc/html/rfc3977#section-3.2)).
pub fn parse_response(line: &str) -> Result<NntpResponse, NntpError> {
    let invalid = || NntpError::Protocol(format!("invalid response line: {line:?}"));

    let digits = line.as_bytes().get(..3).ok_or_else(invalid)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let code: u16 = line[..3].parse().map_err(|_| invalid())?;
    if !(100..=599).contains(&code) {
        return Err(invalid());
    }

    let message = match &line[3..] {
        "" => "",
        rest => rest.strip_prefix(' ').ok_or_else(invalid)?,
    };

    Ok(NntpResponse {
        code,
        message: message.trim().to_string(),
    })
}

/// Parse a status line and validate its code.
pub fn check_status(line: &str, expected: Expect) -> Result<NntpResponse, NntpError> {
    let resp = parse_response(line)?;
    if !expected.accepts(resp.code) {
        return Err(NntpError::UnexpectedStatus {
            code: resp.code,
            message: resp.message,
            expected,
        });
    }
    Ok(resp)
}

/// Parse one `LIST ACTIVE` line: `name high low flag`.
///
/// Returns `None` for lines that are short or carry non-numeric watermarks.
pub fn parse_list_line(line: &str) -> Option<Group> {
    let mut parts = line.split(' ');
    let (Some(name), Some(high), Some(low), Some(flag)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let high = high.parse().ok()?;
    let low = low.parse().ok()?;
    Some(Group {
        name: name.to_string(),
        count: 0,
        low,
        high,
        posting: PostingStatus::from_flag(flag),
    })
}

/// Parse the 211 text of `GROUP`: `count low high name`.
pub fn parse_group_response(message: &str) -> Result<Group, NntpError> {
    let unparsable = || NntpError::Protocol(format!("cannot parse GROUP response: {message}"));

    let parts: Vec<&str> = message.split(' ').collect();
    let [count, low, high, name] = parts.as_slice() else {
        return Err(unparsable());
    };

    Ok(Group {
        name: name.to_string(),
        count: count.parse().map_err(|_| unparsable())?,
        low: low.parse().map_err(|_| unparsable())?,
        high: high.parse().map_err(|_| unparsable())?,
        posting: PostingStatus::Permitted,
    })
}

/// Parse the 220/221/222 text: `<number> <message-id or text>`.
pub fn parse_article_status(message: &str) -> Result<(i64, String), NntpError> {
    let (number, rest) = message
        .split_once(' ')
        .ok_or_else(|| NntpError::Protocol(format!("cannot parse article response: {message}")))?;
    let number = number
        .parse()
        .map_err(|_| NntpError::Protocol(format!("invalid article number: {number}")))?;
    Ok((number, rest.to_string()))
}

/// Hide the argument of `AUTHINFO PASS` before a command line is logged.
pub fn redact_command(line: &str) -> &str {
    match line.get(..13) {
        Some(prefix) if prefix.eq_ignore_ascii_case("AUTHINFO PASS") => "AUTHINFO PASS ****",
        _ => line,
    }
}
