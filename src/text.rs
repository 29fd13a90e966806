use std::time::Duration;

const COLOR_CHAR: char = '\u{a7}';
const COLOR_CODES: &str = "0123456789AaBbCcDdEeFfKkLlMmNnOoRrXx";

/// Translates `&x` colour codes into the section-sign form clients render.
pub fn colorize(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '&' {
            if let Some(&code) = chars.peek() {
                if COLOR_CODES.contains(code) {
                    out.push(COLOR_CHAR);
                    out.push(code.to_ascii_lowercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

/// Substitutes `{key}` placeholders and colourises the result.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut message = template.to_string();
    for (key, value) in values {
        message = message.replace(&format!("{{{key}}}"), value);
    }
    colorize(&message)
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3_600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3_600, (seconds % 3_600) / 60)
    }
}
