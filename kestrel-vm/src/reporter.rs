//! Exception formatting: filename:line, source line, caret underline, and
//! stack trace, with columns corrected for wrapped module sources.

use crate::runtime::{ExceptionSite, ScriptError, ScriptOrigin};

/// Formats a script failure for the log. Returns the full report; the
/// embedder-facing buffer receives only [`exception_message`].
pub(crate) fn format_exception(error: &ScriptError, origin: &ScriptOrigin) -> String {
    let Some(site) = error.site.as_ref() else {
        return error.message.clone();
    };

    let mut report = String::new();
    report.push_str(&format!("{}:{}\n", site.resource, site.line));
    report.push_str(&site.source_line);
    report.push('\n');
    report.push_str(&caret_line(site, origin));
    report.push('\n');
    match site.stack.as_deref() {
        Some(stack) if !stack.is_empty() => report.push_str(stack),
        _ => report.push_str(&error.message),
    }
    report
}

/// The message copied back to the embedder (without source context or
/// stack).
pub(crate) fn exception_message(error: &ScriptError) -> String {
    error.message.clone()
}

/// Builds the caret underline. When the failing line is the first line of
/// the compiled unit, the origin's column offset is subtracted so the caret
/// aligns with the original source rather than the wrapper.
fn caret_line(site: &ExceptionSite, origin: &ScriptOrigin) -> String {
    let script_start = if site.line - origin.line_offset == 1 {
        origin.column_offset
    } else {
        0
    };

    let mut start = site.start_column;
    if start >= script_start {
        start -= script_start;
    }
    let start = start.max(0) as usize;

    let mut arrow = String::with_capacity(start + 1);
    for (i, c) in site.source_line.chars().enumerate() {
        if i >= start {
            break;
        }
        arrow.push(if c == '\t' { '\t' } else { ' ' });
    }
    while arrow.chars().count() < start {
        arrow.push(' ');
    }
    arrow.push('^');
    arrow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ScriptErrorKind;

    fn site() -> ExceptionSite {
        ExceptionSite {
            resource: "contract.js".to_string(),
            line: 3,
            source_line: "  throw new Error('bad');".to_string(),
            start_column: 2,
            end_column: 7,
            stack: Some("Error: bad\n    at contract.js:3:2".to_string()),
        }
    }

    #[test]
    fn report_has_location_source_caret_and_stack() {
        let error = ScriptError {
            kind: ScriptErrorKind::Runtime,
            message: "Error: bad".to_string(),
            site: Some(site()),
        };
        let origin = ScriptOrigin::new("contract.js", 0);
        let report = format_exception(&error, &origin);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "contract.js:3");
        assert_eq!(lines[1], "  throw new Error('bad');");
        assert_eq!(lines[2], "  ^");
        assert_eq!(lines[3], "Error: bad");
    }

    #[test]
    fn first_line_caret_accounts_for_column_offset() {
        let mut s = site();
        s.line = 1;
        s.start_column = 10;
        s.source_line = "wrapped user source".to_string();
        let error = ScriptError {
            kind: ScriptErrorKind::Runtime,
            message: "boom".to_string(),
            site: Some(s),
        };
        let origin = ScriptOrigin {
            name: "contract.js".to_string(),
            line_offset: 0,
            column_offset: 4,
        };
        let report = format_exception(&error, &origin);
        let caret = report.lines().nth(2).unwrap();
        assert_eq!(caret.chars().position(|c| c == '^'), Some(6));
    }

    #[test]
    fn siteless_errors_pass_message_through() {
        let error = ScriptError::throw("require path is not in lib");
        let origin = ScriptOrigin::new("x.js", 0);
        assert_eq!(format_exception(&error, &origin), "require path is not in lib");
        assert_eq!(exception_message(&error), "require path is not in lib");
    }
}
