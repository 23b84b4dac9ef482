#![allow(clippy::arc_with_non_send_sync)]

pub extern crate error_snippet_derive;

use std::sync::{Arc, Mutex, MutexGuard};

pub use error_snippet::{Diagnostic, Error, GraphicalRenderer, IntoDiagnostic, Result, SimpleDiagnostic};
use error_snippet::{Renderer, Severity};
pub use error_snippet_derive::Diagnostic;

/// Holding block for every diagnostic reported through a [`DiagCtx`].
#[derive(Default)]
struct DiagCtxInner {
    emitted: Vec<Error>,
}

impl DiagCtxInner {
    /// Renders all the stored diagnostics into a [`String`]. Diagnostics
    /// which the renderer fails to format are written as a plain
    /// `severity: message` line instead.
    fn render_buffer(&self, renderer: &mut impl Renderer) -> Option<String> {
        if self.emitted.is_empty() {
            return None;
        }

        let buffer = self
            .emitted
            .iter()
            .map(|diagnostic| {
                renderer
                    .render(diagnostic.as_ref())
                    .unwrap_or_else(|_| format!("{}: {}\n", diagnostic.severity(), diagnostic.message()))
            })
            .collect::<String>();

        Some(buffer)
    }

    /// Determines whether the diagnostic context has been tainted with
    /// one-or-more errors.
    fn is_tainted(&self) -> bool {
        self.emitted.iter().any(|diag| diag.severity() == Severity::Error)
    }
}

/// A context to deal with diagnostics, which lives for the entire run of
/// a tool.
///
/// Diagnostics are collected as they are reported and rendered once the run
/// is over, so a single violation never cuts the run short.
#[derive(Clone, Default)]
pub struct DiagCtx {
    inner: Arc<Mutex<DiagCtxInner>>,
}

impl DiagCtx {
    pub fn new() -> Self {
        DiagCtx::default()
    }

    /// # Panics
    ///
    /// Panics if the inner diagnostics context has been poisoned by another
    /// thread.
    fn inner(&self) -> MutexGuard<'_, DiagCtxInner> {
        self.inner.lock().unwrap()
    }

    /// Create a handle for the diagnostic context, which can be
    /// used to emit diagnositcs to the inner context.
    pub fn handle(&self) -> DiagCtxHandle {
        DiagCtxHandle {
            inner: Arc::clone(&self.inner),
            emitted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Gets the amount of diagnostics reported to the context.
    pub fn count(&self) -> usize {
        self.inner().emitted.len()
    }

    /// Determines whether the diagnostic context has been tainted with
    /// one-or-more errors.
    pub fn is_tainted(&self) -> bool {
        self.inner().is_tainted()
    }

    /// Renders all the stored diagnostics to the standard error output
    /// (`stderr`).
    pub fn render_stderr(&self, renderer: &mut impl Renderer) {
        if let Some(buffer) = self.render_buffer(renderer) {
            eprint!("{buffer}");
        }
    }

    /// Renders all the stored diagnostics into a [`String`]
    pub fn render_buffer(&self, renderer: &mut impl Renderer) -> Option<String> {
        self.inner().render_buffer(renderer)
    }

    /// Creates a new handle, which is only valid within the given closure,
    /// which is executed immediately. Upon finishing the closure, all
    /// diagnostics reported within it are pushed to the context.
    pub fn with_none(&self, f: impl FnOnce(DiagCtxHandle)) {
        let handle = self.handle();
        f(handle.clone());

        handle.push();
    }
}

/// A handle to a parent [`DiagCtx`].
///
/// Diagnostics emitted on the handle are held back until the handle is
/// pushed, so a caller can discard or batch them.
#[derive(Clone)]
pub struct DiagCtxHandle {
    inner: Arc<Mutex<DiagCtxInner>>,
    emitted: Arc<Mutex<Vec<Error>>>,
}

impl DiagCtxHandle {
    /// Emits the given diagnostic to the handle. It reaches the parent
    /// context once [`DiagCtxHandle::push`] is called.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been poisoned by another thread.
    pub fn emit(&self, diag: Error) {
        self.emitted.lock().unwrap().push(diag);
    }

    /// Moves every diagnostic emitted on this handle to the parent context.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been poisoned by another thread.
    pub fn push(&self) {
        let mut emitted = self.emitted.lock().unwrap();

        self.inner.lock().unwrap().emitted.append(&mut emitted);
    }
}

pub trait MapDiagnostic<T> {
    /// If the instance is a [`std::result::Result::Err`], declares it as a
    /// cause of a new [`Diagnostic`] with the given message.
    fn map_cause(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync> MapDiagnostic<T> for std::result::Result<T, E> {
    fn map_cause(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|err| {
            let diag = SimpleDiagnostic::new(message).add_cause(err.into_diagnostic());

            Box::new(diag) as Error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_holds_diagnostics_until_pushed() {
        let dcx = DiagCtx::new();
        let handle = dcx.handle();

        handle.emit(SimpleDiagnostic::new("first").into());
        assert_eq!(dcx.count(), 0);

        handle.push();
        assert_eq!(dcx.count(), 1);
        assert!(dcx.is_tainted());
    }

    #[test]
    fn warnings_do_not_taint() {
        let dcx = DiagCtx::new();
        dcx.with_none(|handle| {
            handle.emit(
                SimpleDiagnostic::new("zero-size allocation returned null")
                    .with_severity(Severity::Warning)
                    .into(),
            );
        });

        assert_eq!(dcx.count(), 1);
        assert!(!dcx.is_tainted());
    }

    #[test]
    fn with_none_pushes_on_exit() {
        let dcx = DiagCtx::new();
        dcx.with_none(|handle| handle.emit(SimpleDiagnostic::new("late").into()));

        assert_eq!(dcx.count(), 1);
    }

    #[test]
    fn map_cause_wraps_error() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("disk on fire"));
        let err = res.map_cause("could not read config file").unwrap_err();

        assert_eq!(err.message(), "could not read config file");
    }

    #[test]
    fn render_buffer_is_empty_without_diagnostics() {
        let dcx = DiagCtx::new();

        assert!(dcx.render_buffer(&mut GraphicalRenderer::new()).is_none());
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render_fmt(&mut self, _: &mut error_snippet::Formatter, _: &dyn Diagnostic) -> std::fmt::Result {
            Err(std::fmt::Error)
        }
    }

    #[test]
    fn render_buffer_keeps_unrenderable_diagnostics() {
        let dcx = DiagCtx::new();
        dcx.with_none(|handle| {
            handle.emit(SimpleDiagnostic::new("calloc returned dirty memory").into());
            handle.emit(
                SimpleDiagnostic::new("zero-size allocation returned null")
                    .with_severity(Severity::Warning)
                    .into(),
            );
        });

        let buffer = dcx.render_buffer(&mut FailingRenderer).unwrap();

        assert!(buffer.contains("calloc returned dirty memory"), "{buffer}");
        assert!(buffer.contains("zero-size allocation returned null"), "{buffer}");
        assert_eq!(buffer.lines().count(), 2);
    }
}
