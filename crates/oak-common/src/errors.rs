use std::fmt;

use crate::span::Span;

/// Which back end raised a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The tree-walking evaluator; one diagnostic per failed top-level statement.
    Evaluation,
    /// The assembly generator; its first error ends generation.
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Evaluation => "evaluation",
            Stage::Generation => "codegen",
        })
    }
}

/// An error reported to the host, anchored at the node that raised it.
///
/// Every Oak diagnostic is an error and every one carries a span; the
/// stage tells the host whether later statements still ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub span: Span,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn evaluation(message: impl Into<String>, span: Span) -> Self {
        Self::new(Stage::Evaluation, message, span)
    }

    pub fn generation(message: impl Into<String>, span: Span) -> Self {
        Self::new(Stage::Generation, message, span)
    }

    fn new(stage: Stage, message: impl Into<String>, span: Span) -> Self {
        Self {
            stage,
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// True when the generator raised it, so no assembly was produced.
    pub fn is_fatal(&self) -> bool {
        self.stage == Stage::Generation
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.stage, self.message)?;
        if !self.span.is_dummy() {
            write!(f, "\n  --> {}", self.span)?;
        }
        Ok(())
    }
}

/// Diagnostics in the order they were reported.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_location() {
        let diag = Diagnostic::evaluation("variable 'x' is not declared", Span::point(4, 2));
        assert_eq!(
            diag.to_string(),
            "error[evaluation]: variable 'x' is not declared\n  --> 4:2"
        );
        let diag = Diagnostic::generation("unknown builtin 'sqrt'", Span::dummy());
        assert_eq!(diag.to_string(), "error[codegen]: unknown builtin 'sqrt'");
    }

    #[test]
    fn only_generation_errors_are_fatal() {
        assert!(Diagnostic::generation("x", Span::dummy()).is_fatal());
        assert!(!Diagnostic::evaluation("x", Span::dummy()).is_fatal());
    }

    #[test]
    fn bag_keeps_report_order() {
        let mut bag = DiagnosticBag::new();
        assert!(bag.is_empty());
        bag.report(Diagnostic::evaluation("first", Span::point(1, 1)));
        bag.report(Diagnostic::evaluation("second", Span::point(2, 1)));
        assert_eq!(bag.len(), 2);
        let messages: Vec<String> = bag.into_diagnostics().into_iter().map(|d| d.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }
}
