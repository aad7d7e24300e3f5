use colored::{ColoredString, Colorize};
use declarative::{DriftAction, Severity};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

// ============================================================================
// Drift Rendering
// ============================================================================

/// Fixed-width severity badge
pub fn severity_badge(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.as_str());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::Warning => label.yellow(),
        Severity::Info => label.dimmed(),
    }
}

/// Colored `+`/`~`/`-` marker
pub fn action_symbol(action: DriftAction) -> ColoredString {
    match action {
        DriftAction::Added => action.symbol().green(),
        DriftAction::Modified => action.symbol().yellow(),
        DriftAction::Removed => action.symbol().red(),
    }
}

/// Compact single-line rendering of a JSON value
pub fn format_value(value: Option<&serde_json::Value>) -> String {
    const MAX: usize = 60;
    let Some(value) = value else {
        return "(absent)".to_string();
    };
    let text = match value {
        serde_json::Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    };
    truncate(&text, MAX)
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_short() {
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_long() {
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("abcdefghijkl", 2), "...");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(None), "(absent)");
        assert_eq!(format_value(Some(&json!("Days"))), "\"Days\"");
        assert_eq!(format_value(Some(&json!(30))), "30");
        assert_eq!(format_value(Some(&json!({"a": 1}))), "{\"a\":1}");
    }

    #[test]
    fn test_format_value_truncates() {
        let long = json!("x".repeat(200));
        assert!(format_value(Some(&long)).ends_with("..."));
    }
}
