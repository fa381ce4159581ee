use std::collections::HashMap;

use crate::error::ConfigError;

/// Parse `Key=Value` lines into a map.
///
/// Blank lines and lines starting with `#` are ignored. Values may refer to
/// keys defined on earlier lines as `${Key}`, and a later line for the same
/// key replaces the earlier value.
pub fn parse_config(content: &str) -> Result<HashMap<String, String>, ConfigError> {
    content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .try_fold(HashMap::new(), |mut values, (line_no, line)| {
            let (key, raw) = split_entry(line).map_err(|message| ConfigError::SyntaxError {
                line: line_no,
                message: message.into(),
            })?;
            let value = interpolate(raw, &values)?;
            values.insert(key.to_owned(), value);
            Ok::<_, ConfigError>(values)
        })
}

/// Split on the first `=`; the value keeps any further `=` characters.
fn split_entry(line: &str) -> Result<(&str, &str), &'static str> {
    let Some((key, value)) = line.split_once('=') else {
        return Err("expected Key=Value");
    };
    let key = key.trim_end();
    if key.is_empty() {
        return Err("empty key");
    }
    if key.contains(char::is_whitespace) {
        return Err("key contains whitespace");
    }
    Ok((key, value.trim_start()))
}

/// Expand `~` and `~/...` to the home directory, then substitute `${Name}`
/// references from `resolved`.
pub fn interpolate(value: &str, resolved: &HashMap<String, String>) -> Result<String, ConfigError> {
    let value = expand_home(value);
    let mut out = String::with_capacity(value.len());
    let mut rest = value.as_str();

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnterminatedVariable(rest[start..].to_owned()));
        };
        let name = &after[..end];
        match resolved.get(name) {
            Some(found) => out.push_str(found),
            None => return Err(ConfigError::UnknownVariable(name.to_owned())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand_home(value: &str) -> String {
    let tail = match value.strip_prefix('~') {
        Some(tail) if tail.is_empty() || tail.starts_with('/') => tail,
        _ => return value.to_owned(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{tail}", home.display()),
        None => value.to_owned(),
    }
}

/// Apply `-o Key=Value` overrides on top of the parsed file.
pub fn apply_overrides(
    raw: &mut HashMap<String, String>,
    overrides: &[String],
) -> Result<(), ConfigError> {
    for opt in overrides {
        let (key, value) =
            split_entry(opt.trim()).map_err(|_| ConfigError::InvalidOverride(opt.clone()))?;
        let value = interpolate(value, raw)?;
        raw.insert(key.to_owned(), value);
    }
    Ok(())
}

/// Read a yes/no style flag, falling back to `default` when unset or unrecognized.
pub fn parse_bool(value: Option<&String>, default: bool) -> bool {
    const TRUE: [&str; 3] = ["yes", "true", "1"];
    const FALSE: [&str; 3] = ["no", "false", "0"];

    let Some(value) = value else {
        return default;
    };
    if TRUE.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        true
    } else if FALSE.iter().any(|f| value.eq_ignore_ascii_case(f)) {
        false
    } else {
        default
    }
}
