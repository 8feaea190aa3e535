//! What the attached terminal can show: width, colour, and a TTY check.

use std::env;

/// Width assumed when stdout is piped or the size query fails.
const FALLBACK_WIDTH: usize = 80;

pub fn is_tty() -> bool {
    crossterm::tty::IsTty::is_tty(&std::io::stdout())
}

/// Column count of the terminal. Piped output always gets
/// [`FALLBACK_WIDTH`] so `hv issues list | grep` does not depend on the
/// window it was started from.
pub fn terminal_width() -> usize {
    if !is_tty() {
        return FALLBACK_WIDTH;
    }
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => FALLBACK_WIDTH,
    }
}

/// Whether to emit ANSI colour, from the process environment and stdout.
pub fn supports_color() -> bool {
    color_enabled(|key| env::var(key).ok(), is_tty())
}

/// `NO_COLOR` wins, then `CLICOLOR=0` and `TERM=dumb` disable,
/// `CLICOLOR_FORCE` enables, and otherwise colour follows `tty`.
fn color_enabled(var: impl Fn(&str) -> Option<String>, tty: bool) -> bool {
    if var("NO_COLOR").is_some() {
        return false;
    }
    if var("CLICOLOR").as_deref() == Some("0") || var("TERM").as_deref() == Some("dumb") {
        return false;
    }
    var("CLICOLOR_FORCE").is_some() || tty
}

/// Cuts `s` to at most `width` characters, ending in an ellipsis when cut.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(width - 1).collect();
    out.push('\u{2026}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn width_is_never_zero() {
        assert!(terminal_width() > 0);
    }

    #[test]
    fn color_rules() {
        assert!(color_enabled(env_of(&[]), true));
        assert!(!color_enabled(env_of(&[]), false));
        assert!(!color_enabled(env_of(&[("NO_COLOR", "1"), ("CLICOLOR_FORCE", "1")]), true));
        assert!(!color_enabled(env_of(&[("CLICOLOR", "0")]), true));
        assert!(!color_enabled(env_of(&[("TERM", "dumb")]), true));
        assert!(color_enabled(env_of(&[("CLICOLOR_FORCE", "1")]), false));
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long summary", 6), "a lon\u{2026}");
        assert_eq!(truncate("abc", 0), "");
    }
}
