//! Plain-text rendering of inbound output.

use std::fmt::Write as _;

use remote_shell_core::{CommandCatalogue, RemoteError};

use crate::builtin::BuiltIn;

/// Width of the progress bar, in cells.
pub const PROGRESS_WIDTH: usize = 30;

/// Render a progress line, e.g. `copy [====      ] 45% (45/100)`.
///
/// `progress` is clamped to `whole`; a zero `whole` renders as empty.
#[must_use]
pub fn progress_bar(title: &str, progress: u64, whole: u64, width: usize, fill: char) -> String {
    let progress = progress.min(whole);
    let (filled, percent) = if whole == 0 {
        (0, 0)
    } else {
        let filled = u128::from(progress) * width as u128 / u128::from(whole);
        let percent = u128::from(progress) * 100 / u128::from(whole);
        (usize::try_from(filled).unwrap_or(width), percent)
    };

    let mut bar = String::with_capacity(width);
    bar.extend(std::iter::repeat_n(fill, filled));
    bar.extend(std::iter::repeat_n(' ', width - filled));

    format!("{title} [{bar}] {percent}% ({progress}/{whole})")
}

/// Render a remote failure.
#[must_use]
pub fn remote_error(error: &RemoteError, show_detail: bool) -> String {
    match (&error.detail, show_detail) {
        (Some(detail), true) => format!("{error}\n{detail}"),
        _ => error.to_string(),
    }
}

/// Render the numbered history list.
#[must_use]
pub fn history(entries: &[String]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "{:>4}  {entry}", i + 1);
    }
    out.truncate(out.trim_end().len());
    out
}

/// Render built-ins followed by the remote catalogue.
#[must_use]
pub fn help(catalogue: &CommandCatalogue) -> String {
    let builtins = BuiltIn::descriptions();
    let width = builtins
        .iter()
        .map(|(usage, _)| usage.len())
        .chain(catalogue.iter().map(|d| usage_of(d).len()))
        .max()
        .unwrap_or(0);

    let mut out = String::from("Built-in commands:\n");
    for (usage, description) in &builtins {
        let _ = writeln!(out, "  {usage:<width$}  {description}");
    }

    out.push_str("Remote commands:\n");
    if catalogue.is_empty() {
        out.push_str("  (none published yet)\n");
    }
    for descriptor in catalogue.iter() {
        let _ = writeln!(
            out,
            "  {:<width$}  {}",
            usage_of(descriptor),
            descriptor.description
        );
    }
    out.truncate(out.trim_end().len());
    out
}

fn usage_of(descriptor: &remote_shell_core::CommandDescriptor) -> &str {
    descriptor.usage.as_deref().unwrap_or(&descriptor.name)
}

#[cfg(test)]
mod tests {
    use remote_shell_core::{CommandDescriptor, error_kind};

    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(
            progress_bar("copy", 45, 100, 10, '='),
            "copy [====      ] 45% (45/100)"
        );
        assert_eq!(
            progress_bar("copy", 100, 100, 4, '='),
            "copy [====] 100% (100/100)"
        );
    }

    #[test]
    fn test_progress_bar_edge_cases() {
        assert_eq!(progress_bar("idle", 5, 0, 4, '='), "idle [    ] 0% (0/0)");
        assert_eq!(
            progress_bar("over", 150, 100, 4, '#'),
            "over [####] 100% (100/100)"
        );
        assert_eq!(
            progress_bar("big", u64::MAX, u64::MAX, 2, '='),
            format!("big [==] 100% ({0}/{0})", u64::MAX)
        );
    }

    #[test]
    fn test_remote_error_detail() {
        let error = RemoteError::new(error_kind::FAILED, "disk full").with_detail("at write()");
        assert_eq!(remote_error(&error, false), "failed: disk full");
        assert_eq!(remote_error(&error, true), "failed: disk full\nat write()");
    }

    #[test]
    fn test_history() {
        let entries = vec!["ls".to_string(), "sleep 10".to_string()];
        assert_eq!(history(&entries), "   1  ls\n   2  sleep 10");
        assert_eq!(history(&[]), "");
    }

    #[test]
    fn test_help_lists_remote_commands() {
        let catalogue: CommandCatalogue = [
            CommandDescriptor::new("echo", "Print arguments"),
            CommandDescriptor::new("sleep", "Wait").with_usage("sleep <millis>"),
        ]
        .into_iter()
        .collect();

        let text = help(&catalogue);
        assert!(text.starts_with("Built-in commands:\n  exit|ex|quit|qu"));
        assert!(text.contains("echo"));
        assert!(
            text.lines()
                .any(|line| line.contains("sleep <millis>") && line.ends_with("Wait"))
        );
        assert!(!text.contains("none published"));
    }
}
