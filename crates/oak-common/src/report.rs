use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::errors::Diagnostic;

/// Print a diagnostic to stderr.
///
/// With the source text available and a parsed span, the report is rendered
/// by ariadne with a labelled excerpt; otherwise a plain `error[stage]: ...`
/// line is printed.
pub fn print_diagnostic(diag: &Diagnostic, source: Option<&str>, file_name: &str) {
    match source {
        Some(source) if !diag.span.is_dummy() => {
            let range = diag.span.byte_range();
            let color = if diag.is_fatal() {
                Color::Red
            } else {
                Color::Magenta
            };

            let mut report = Report::build(ReportKind::Error, file_name, range.start)
                .with_message(format!("[{}] {}", diag.stage, diag.message))
                .with_label(
                    Label::new((file_name, range))
                        .with_message(&diag.message)
                        .with_color(color),
                );

            if let Some(ref suggestion) = diag.suggestion {
                report = report.with_help(suggestion);
            }

            if report
                .finish()
                .eprint((file_name, Source::from(source)))
                .is_err()
            {
                print_plain(diag);
            }
        }
        _ => print_plain(diag),
    }
}

fn print_plain(diag: &Diagnostic) {
    eprintln!("{}", diag);
    if let Some(ref suggestion) = diag.suggestion {
        eprintln!("   = help: {}", suggestion);
    }
    eprintln!();
}
