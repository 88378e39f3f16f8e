//! Terminal output helpers shared by every command

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn is_json(self) -> bool {
        self == OutputFormat::Json
    }
}

/// Writes command results in the selected format
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Plain text with status markers
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }
    fn info(&self, message: &str) {
        println!("  {message}");
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// One JSON document per result on stdout; diagnostics go to stderr
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", serde_json::json!({"success": true, "message": message}));
    }
    fn error(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"success": false, "error": message}));
    }
    fn warn(&self, message: &str) {
        eprintln!("{}", serde_json::json!({"level": "warning", "message": message}));
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// First eight characters of an identifier, for table columns
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Formats a ratio in [0, 1] as a whole percentage
pub fn percent(ratio: f64) -> String {
    format!("{:.0}%", (ratio * 100.0).clamp(0.0, 100.0))
}

/// Formats a millisecond duration with the largest sensible unit
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1_000.0 {
        format!("{ms:.0} ms")
    } else if ms < 60_000.0 {
        format!("{:.1} s", ms / 1_000.0)
    } else if ms < 3_600_000.0 {
        format!("{:.1} min", ms / 60_000.0)
    } else {
        format!("{:.1} h", ms / 3_600_000.0)
    }
}

/// `"1 conflict"` / `"3 conflicts"`
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates_long_ids() {
        assert_eq!(short_id("0b6c1f2e-9a4d-4f4e-8c57-2d3a1b0c9e11"), "0b6c1f2e");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn test_percent_rounds_and_clamps() {
        assert_eq!(percent(0.0), "0%");
        assert_eq!(percent(0.756), "76%");
        assert_eq!(percent(1.0), "100%");
        assert_eq!(percent(1.5), "100%");
    }

    #[test]
    fn test_format_duration_units() {
        assert_eq!(format_duration_ms(250.0), "250 ms");
        assert_eq!(format_duration_ms(1_500.0), "1.5 s");
        assert_eq!(format_duration_ms(90_000.0), "1.5 min");
        assert_eq!(format_duration_ms(5_400_000.0), "1.5 h");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "conflict"), "1 conflict");
        assert_eq!(plural(0, "conflict"), "0 conflicts");
        assert_eq!(plural(2, "pattern"), "2 patterns");
    }

    #[test]
    fn test_format_from_flag() {
        assert!(OutputFormat::from_flag(true).is_json());
        assert!(!OutputFormat::from_flag(false).is_json());
    }
}
