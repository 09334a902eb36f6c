//! Per-tick execution context provided to systems.

use tracing::Span;

/// Context passed to every system update during one tick.
///
/// The tracing span travels with the context because span state is
/// thread-local and updates run on worker threads.
#[derive(Debug, Clone)]
pub struct TickContext {
    /// The current tick ID.
    pub tick_id: u64,
    /// Delta time since the last tick, in seconds.
    pub dt: f64,
    span: Span,
}

impl TickContext {
    /// Create a new context for a tick, without a parent span.
    #[must_use]
    pub fn new(tick_id: u64, dt: f64) -> Self {
        Self {
            tick_id,
            dt,
            span: Span::none(),
        }
    }

    /// Attach the span that work for this tick should be recorded under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The span of the tick (or of the enclosing pipeline node).
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = TickContext::new(1, 0.016);
        assert_eq!(ctx.tick_id, 1);
        assert!((ctx.dt - 0.016).abs() < f64::EPSILON);
        assert!(ctx.span().is_none());
    }

    #[test]
    fn test_with_span_keeps_timing() {
        let ctx = TickContext::new(7, 0.5).with_span(tracing::info_span!("tick"));
        assert_eq!(ctx.tick_id, 7);
        assert!((ctx.dt - 0.5).abs() < f64::EPSILON);
    }
}
