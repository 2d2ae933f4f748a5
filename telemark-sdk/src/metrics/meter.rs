use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use telemark::{tele_warn, InstrumentationScope};

use crate::metrics::instrument::{
    valid_instrument_name, Counter, Gauge, Histogram, InstrumentDescriptor, InstrumentInner,
    InstrumentKind, ObservableCounter, ObservableGauge, ObservableUpDownCounter, Observer,
    UpDownCounter,
};
use crate::metrics::internal::Number;
use crate::metrics::pipeline::MetricPipeline;

type Callback<T> = Arc<dyn Fn(&Observer<T>) + Send + Sync>;

/// Creates instruments scoped to one instrumentation library.
///
/// Cheap to clone; all clones feed the same provider pipelines.
#[derive(Clone)]
pub struct Meter {
    pub(crate) scope: InstrumentationScope,
    pub(crate) pipelines: Arc<[Arc<MetricPipeline>]>,
    pub(crate) registry: Arc<Mutex<Vec<InstrumentDescriptor>>>,
}

impl Meter {
    /// A monotonic `i64` counter.
    pub fn i64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<i64>> {
        InstrumentBuilder::new(self, InstrumentKind::Counter, name.into())
    }

    /// A monotonic `f64` counter.
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, InstrumentKind::Counter, name.into())
    }

    /// An `i64` sum that can decrease.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, InstrumentKind::UpDownCounter, name.into())
    }

    /// An `f64` sum that can decrease.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, InstrumentKind::UpDownCounter, name.into())
    }

    /// An `i64` value distribution.
    pub fn i64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Histogram<i64>> {
        InstrumentBuilder::new(self, InstrumentKind::Histogram, name.into())
    }

    /// An `f64` value distribution.
    pub fn f64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Histogram<f64>> {
        InstrumentBuilder::new(self, InstrumentKind::Histogram, name.into())
    }

    /// An `i64` last-value gauge.
    pub fn i64_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Gauge<i64>> {
        InstrumentBuilder::new(self, InstrumentKind::Gauge, name.into())
    }

    /// An `f64` last-value gauge.
    pub fn f64_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Gauge<f64>> {
        InstrumentBuilder::new(self, InstrumentKind::Gauge, name.into())
    }

    /// A callback-driven monotonic counter reporting running totals.
    pub fn i64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableCounter<i64>, i64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableCounter, name.into())
    }

    /// A callback-driven monotonic counter reporting running totals.
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableCounter<f64>, f64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableCounter, name.into())
    }

    /// A callback-driven up-down counter reporting running totals.
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableUpDownCounter<i64>, i64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableUpDownCounter, name.into())
    }

    /// A callback-driven up-down counter reporting running totals.
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableUpDownCounter<f64>, f64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableUpDownCounter, name.into())
    }

    /// A callback-driven gauge.
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableGauge<i64>, i64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableGauge, name.into())
    }

    /// A callback-driven gauge.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableGauge<f64>, f64> {
        ObservableInstrumentBuilder::new(self, InstrumentKind::ObservableGauge, name.into())
    }

    /// Resolve an instrument into one stream per pipeline. Invalid names
    /// produce an inert instrument rather than an error on the record
    /// path.
    fn resolve<T: Number>(
        &self,
        descriptor: InstrumentDescriptor,
        bounds_hint: Option<Vec<f64>>,
    ) -> Arc<InstrumentInner<T>> {
        if !self.check_descriptor(&descriptor) {
            return Arc::new(InstrumentInner { streams: vec![] });
        }
        let streams = self
            .pipelines
            .iter()
            .map(|pipeline| pipeline.create_stream(&self.scope, &descriptor, bounds_hint.clone()))
            .collect();
        Arc::new(InstrumentInner { streams })
    }

    fn resolve_observable<T: Number>(
        &self,
        descriptor: InstrumentDescriptor,
        callbacks: Vec<Callback<T>>,
    ) {
        if !self.check_descriptor(&descriptor) {
            return;
        }
        for pipeline in self.pipelines.iter() {
            let stream = pipeline.create_stream::<T>(&self.scope, &descriptor, None);
            let observer = Observer {
                streams: vec![stream],
            };
            let callbacks = callbacks.clone();
            pipeline.register_callback(Box::new(move || {
                for callback in &callbacks {
                    callback(&observer);
                }
            }));
        }
    }

    /// Validates the name and logs identity collisions. Returns whether
    /// streams should be created.
    fn check_descriptor(&self, descriptor: &InstrumentDescriptor) -> bool {
        if !valid_instrument_name(&descriptor.name) {
            tele_warn!(
                name: "Meter.InvalidInstrumentName",
                instrument_name = descriptor.name.to_string(),
                message = "instrument names must start with a letter and contain only alphanumerics, '_', '.', '-', '/'; a no-op instrument was returned"
            );
            return false;
        }
        if let Ok(mut registry) = self.registry.lock() {
            if registry
                .iter()
                .any(|existing| existing.conflicts_with(descriptor))
            {
                tele_warn!(
                    name: "Meter.DuplicateInstrument",
                    instrument_name = descriptor.name.to_string(),
                    message = "an instrument with the same case-insensitive name but a different identity already exists; both will be exported"
                );
            }
            registry.push(descriptor.clone());
        }
        true
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("scope", &self.scope).finish()
    }
}

/// Configures a synchronous instrument before creation.
pub struct InstrumentBuilder<'a, I> {
    meter: &'a Meter,
    kind: InstrumentKind,
    name: Cow<'static, str>,
    unit: Cow<'static, str>,
    description: Cow<'static, str>,
    boundaries: Option<Vec<f64>>,
    _instrument: PhantomData<I>,
}

impl<'a, I> InstrumentBuilder<'a, I> {
    fn new(meter: &'a Meter, kind: InstrumentKind, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            kind,
            name,
            unit: "".into(),
            description: "".into(),
            boundaries: None,
            _instrument: PhantomData,
        }
    }

    /// Set the unit of measure, e.g. `"ms"` or `"{request}"`.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the human-readable description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    fn descriptor(&self) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: self.name.clone(),
            unit: self.unit.clone(),
            description: self.description.clone(),
            kind: self.kind,
        }
    }
}

impl<T: Number> InstrumentBuilder<'_, Counter<T>> {
    /// Create the counter.
    pub fn build(self) -> Counter<T> {
        Counter {
            inner: self.meter.resolve(self.descriptor(), None),
        }
    }
}

impl<T: Number> InstrumentBuilder<'_, UpDownCounter<T>> {
    /// Create the up-down counter.
    pub fn build(self) -> UpDownCounter<T> {
        UpDownCounter {
            inner: self.meter.resolve(self.descriptor(), None),
        }
    }
}

impl<T: Number> InstrumentBuilder<'_, Histogram<T>> {
    /// Advise the default bucket bounds for this histogram; a matching
    /// view still wins.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Create the histogram.
    pub fn build(self) -> Histogram<T> {
        let boundaries = self.boundaries.clone();
        Histogram {
            inner: self.meter.resolve(self.descriptor(), boundaries),
        }
    }
}

impl<T: Number> InstrumentBuilder<'_, Gauge<T>> {
    /// Create the gauge.
    pub fn build(self) -> Gauge<T> {
        Gauge {
            inner: self.meter.resolve(self.descriptor(), None),
        }
    }
}

impl<I> fmt::Debug for InstrumentBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Configures an observable instrument and its callbacks before creation.
pub struct ObservableInstrumentBuilder<'a, I, T: Number> {
    meter: &'a Meter,
    kind: InstrumentKind,
    name: Cow<'static, str>,
    unit: Cow<'static, str>,
    description: Cow<'static, str>,
    callbacks: Vec<Callback<T>>,
    _instrument: PhantomData<I>,
}

impl<'a, I, T: Number> ObservableInstrumentBuilder<'a, I, T> {
    fn new(meter: &'a Meter, kind: InstrumentKind, name: Cow<'static, str>) -> Self {
        ObservableInstrumentBuilder {
            meter,
            kind,
            name,
            unit: "".into(),
            description: "".into(),
            callbacks: Vec::new(),
            _instrument: PhantomData,
        }
    }

    /// Set the unit of measure.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the human-readable description.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// Register a callback invoked at every collection. Observable sums
    /// report running totals, not increments.
    pub fn with_callback(mut self, callback: impl Fn(&Observer<T>) + Send + Sync + 'static) -> Self {
        self.callbacks.push(Arc::new(callback));
        self
    }

    fn register(self) {
        let descriptor = InstrumentDescriptor {
            name: self.name,
            unit: self.unit,
            description: self.description,
            kind: self.kind,
        };
        self.meter.resolve_observable(descriptor, self.callbacks);
    }
}

impl<T: Number> ObservableInstrumentBuilder<'_, ObservableCounter<T>, T> {
    /// Register the callbacks and return the handle.
    pub fn build(self) -> ObservableCounter<T> {
        self.register();
        ObservableCounter {
            _marker: PhantomData,
        }
    }
}

impl<T: Number> ObservableInstrumentBuilder<'_, ObservableUpDownCounter<T>, T> {
    /// Register the callbacks and return the handle.
    pub fn build(self) -> ObservableUpDownCounter<T> {
        self.register();
        ObservableUpDownCounter {
            _marker: PhantomData,
        }
    }
}

impl<T: Number> ObservableInstrumentBuilder<'_, ObservableGauge<T>, T> {
    /// Register the callbacks and return the handle.
    pub fn build(self) -> ObservableGauge<T> {
        self.register();
        ObservableGauge {
            _marker: PhantomData,
        }
    }
}

impl<I, T: Number> fmt::Debug for ObservableInstrumentBuilder<'_, I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableInstrumentBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
