//! Decision sentinel parsing
//!
//! The buyer terminates a negotiation by emitting, on a single line,
//! `DECISION: ACCEPT $<amount> - <reasoning>` or
//! `DECISION: REJECT - <reasoning>`. Matching is case-insensitive and
//! line-scoped. Anything that does not match is not an error: it simply
//! means the negotiation continues.
//!
//! An accepted amount above the buyer's hard budget is overridden to a
//! rejection; the agent's own reasoning is discarded in that case.

use parley_types::Outcome;

/// Scan a buyer turn for a decision sentinel.
pub fn parse_decision(content: &str, max_payment: f64) -> Option<Outcome> {
    content
        .lines()
        .find_map(|line| parse_line(line, max_payment))
}

fn parse_line(line: &str, max_payment: f64) -> Option<Outcome> {
    let rest = find_token(line, "DECISION:")?.trim_start();

    if let Some(after) = strip_prefix_ci(rest, "ACCEPT") {
        let after = after.trim_start().strip_prefix('$')?;
        let split = after
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(after.len());
        let (number, tail) = after.split_at(split);
        let price: f64 = number.parse().ok()?;

        let reasoning = tail.trim_start().strip_prefix('-')?.trim();
        if reasoning.is_empty() {
            return None;
        }

        if price <= max_payment {
            Some(Outcome::accept(price, reasoning))
        } else {
            Some(Outcome::reject(format!(
                "Proposed price ${} exceeds budget of ${}",
                format_amount(price),
                format_amount(max_payment)
            )))
        }
    } else if let Some(after) = strip_prefix_ci(rest, "REJECT") {
        let reasoning = after.trim_start().strip_prefix('-')?.trim();
        if reasoning.is_empty() {
            return None;
        }
        Some(Outcome::reject(reasoning))
    } else {
        None
    }
}

/// Case-insensitive search for an ASCII token; returns the text after it.
fn find_token<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let token_bytes = token.as_bytes();
    let bytes = line.as_bytes();
    if bytes.len() < token_bytes.len() {
        return None;
    }

    for i in 0..=bytes.len() - token_bytes.len() {
        if line.is_char_boundary(i)
            && bytes[i..i + token_bytes.len()].eq_ignore_ascii_case(token_bytes)
        {
            return Some(&line[i + token_bytes.len()..]);
        }
    }
    None
}

/// Case-insensitive ASCII prefix strip.
fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Render an amount the way it reads in prose: no trailing `.0`.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
