//! Duration token parsing shared by every progress estimator
//!
//! Accepted forms:
//! - clock: `HH:MM:SS[.fff]` or `MM:SS[.fff]`
//! - compound units: `1h2m3.5s`, `90s`, `2m`, `1.5h` (units in h, m, s order)
//! - bare seconds: `12`, `12.5`

/// Convert a duration token to seconds, or `None` if it is not a duration
pub fn parse_duration(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    parse_clock(token)
        .or_else(|| parse_compound_units(token))
        .or_else(|| parse_unsigned(token))
}

/// Render seconds as `HH:MM:SS.mmm`
pub fn format_duration(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

fn parse_clock(token: &str) -> Option<f64> {
    if !token.contains(':') {
        return None;
    }

    let parts: Vec<&str> = token.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let (seconds_part, leading) = parts.split_last()?;

    let seconds = parse_unsigned(seconds_part)?;
    if seconds >= 60.0 {
        return None;
    }

    let mut total: u64 = 0;
    for (index, part) in leading.iter().enumerate() {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        // Minutes in HH:MM:SS are bounded; a leading field is not
        if index > 0 && value >= 60 {
            return None;
        }
        total = total.checked_mul(60)?.checked_add(value)?;
    }

    Some(total as f64 * 60.0 + seconds)
}

fn parse_compound_units(token: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();
    // Index into "hms" of the last unit seen; units must appear in that order
    let mut last_unit: Option<usize> = None;

    for c in token.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }

        let (unit_index, multiplier) = match c.to_ascii_lowercase() {
            'h' => (0, 3600.0),
            'm' => (1, 60.0),
            's' => (2, 1.0),
            _ => return None,
        };
        if last_unit.is_some_and(|last| last >= unit_index) {
            return None;
        }
        let value = parse_unsigned(&number)?;
        total += value * multiplier;
        number.clear();
        last_unit = Some(unit_index);
    }

    // A dangling number without a unit is not a compound duration
    if !number.is_empty() || last_unit.is_none() {
        return None;
    }
    Some(total)
}

fn parse_unsigned(token: &str) -> Option<f64> {
    let mut dots = 0;
    let mut digits = 0;
    for c in token.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 || token.starts_with('.') || token.ends_with('.') {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}
