use std::fmt;

use telemark::trace::{SpanKind, TraceContextExt, TraceId, TraceState};
use telemark::{Context, KeyValue};

use crate::trace::span::Link;

/// What a sampler decided for one new span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Do not record; the span is a pass-through carrying only its
    /// context.
    Drop,
    /// Record in-process but do not export (sampled flag stays clear).
    RecordOnly,
    /// Record and export.
    RecordAndSample,
}

/// A sampler's verdict plus any additions it wants on the span.
#[derive(Clone, Debug)]
pub struct SamplingResult {
    /// The decision.
    pub decision: SamplingDecision,
    /// Extra attributes attached to the span when it records.
    pub attributes: Vec<KeyValue>,
    /// Replacement trace state; `None` keeps the parent's.
    pub trace_state: Option<TraceState>,
}

impl SamplingResult {
    fn plain(decision: SamplingDecision) -> Self {
        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: None,
        }
    }
}

/// Decides, before a span exists, whether it will record and export.
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Decide for a span about to be created.
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;
}

/// The built-in sampling policies.
#[derive(Debug)]
pub enum Sampler {
    /// Sample everything.
    AlwaysOn,
    /// Sample nothing.
    AlwaysOff,
    /// Sample a deterministic ratio of trace ids in `[0.0, 1.0]`.
    ///
    /// The decision is a pure function of the trace id, so every
    /// participant in a trace that uses the same ratio agrees.
    TraceIdRatioBased(f64),
    /// Follow the parent's sampled flag; fall back to the wrapped sampler
    /// for roots.
    ParentBased(Box<dyn ShouldSample>),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        match self {
            Sampler::AlwaysOn => SamplingResult::plain(SamplingDecision::RecordAndSample),
            Sampler::AlwaysOff => SamplingResult::plain(SamplingDecision::Drop),
            Sampler::TraceIdRatioBased(ratio) => {
                if sample_by_ratio(*ratio, trace_id) {
                    SamplingResult::plain(SamplingDecision::RecordAndSample)
                } else {
                    SamplingResult::plain(SamplingDecision::Drop)
                }
            }
            Sampler::ParentBased(root) => {
                let parent = parent_context
                    .and_then(|cx| cx.span_context())
                    .filter(|parent| parent.is_valid());
                match parent {
                    Some(parent) => {
                        let decision = if parent.is_sampled() {
                            SamplingDecision::RecordAndSample
                        } else {
                            SamplingDecision::Drop
                        };
                        SamplingResult {
                            decision,
                            attributes: Vec::new(),
                            trace_state: Some(parent.trace_state().clone()),
                        }
                    }
                    None => root.should_sample(
                        parent_context,
                        trace_id,
                        name,
                        span_kind,
                        attributes,
                        links,
                    ),
                }
            }
        }
    }
}

/// Deterministic ratio test over the low 8 bytes of the trace id.
fn sample_by_ratio(ratio: f64, trace_id: TraceId) -> bool {
    if ratio >= 1.0 {
        return true;
    }
    if ratio <= 0.0 {
        return false;
    }
    let bytes = trace_id.to_bytes();
    let low = u64::from_be_bytes(bytes[8..16].try_into().expect("8 bytes"));
    low < (ratio * u64::MAX as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemark::trace::{SpanContext, SpanId, TraceFlags};

    fn decide(sampler: &Sampler, cx: Option<&Context>, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(cx, trace_id, "op", &SpanKind::Internal, &[], &[])
            .decision
    }

    #[test]
    fn always_on_and_off() {
        let id = TraceId::from_u128(7);
        assert_eq!(
            decide(&Sampler::AlwaysOn, None, id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(decide(&Sampler::AlwaysOff, None, id), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_extremes() {
        let id = TraceId::from_u128(u128::MAX);
        assert_eq!(
            decide(&Sampler::TraceIdRatioBased(1.0), None, id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            decide(&Sampler::TraceIdRatioBased(0.0), None, TraceId::from_u128(1)),
            SamplingDecision::Drop
        );
    }

    #[test]
    fn ratio_is_deterministic_per_trace_id() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        let id = TraceId::from_u128(0xdead_beef);
        let first = decide(&sampler, None, id);
        for _ in 0..10 {
            assert_eq!(decide(&sampler, None, id), first);
        }
    }

    #[test]
    fn ratio_roughly_matches_over_many_ids() {
        use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
        let sampler = Sampler::TraceIdRatioBased(0.25);
        let generator = RandomIdGenerator;
        let sampled = (0..4000)
            .filter(|_| {
                decide(&sampler, None, generator.new_trace_id())
                    == SamplingDecision::RecordAndSample
            })
            .count();
        // 0.25 +- generous slack.
        assert!((600..1400).contains(&sampled), "sampled {sampled} of 4000");
    }

    #[test]
    fn parent_based_follows_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        let sampled_parent = Context::new().with_span_context(SpanContext::new(
            TraceId::from_u128(1),
            SpanId::from_u64(1),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ));
        assert_eq!(
            decide(&sampler, Some(&sampled_parent), TraceId::from_u128(1)),
            SamplingDecision::RecordAndSample
        );

        let unsampled_parent = Context::new().with_span_context(SpanContext::new(
            TraceId::from_u128(2),
            SpanId::from_u64(2),
            TraceFlags::default(),
            true,
            TraceState::default(),
        ));
        assert_eq!(
            decide(&sampler, Some(&unsampled_parent), TraceId::from_u128(2)),
            SamplingDecision::Drop
        );

        // No parent: the root sampler decides.
        assert_eq!(
            decide(&sampler, Some(&Context::new()), TraceId::from_u128(3)),
            SamplingDecision::Drop
        );
    }
}
