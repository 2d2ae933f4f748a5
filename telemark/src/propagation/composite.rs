use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::Context;

/// Runs several [`TextMapPropagator`]s as one.
///
/// Injection writes every propagator's fields; extraction folds the
/// propagators left to right, each seeing the context produced by its
/// predecessor.
#[derive(Debug)]
pub struct CompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl CompositePropagator {
    /// Combine `propagators` into one. Field lists are unioned.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut fields: Vec<String> = propagators
            .iter()
            .flat_map(|p| p.fields().map(String::from))
            .collect();
        fields.sort_unstable();
        fields.dedup();

        CompositePropagator {
            propagators,
            fields,
        }
    }
}

impl TextMapPropagator for CompositePropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(cx, injector);
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |cx, propagator| {
                propagator.extract_with_context(&cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&self.fields)
    }
}
