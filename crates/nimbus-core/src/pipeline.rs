//! Sampling, prediction and fan-out loop
//!
//! [`DeliveryPipeline::tick`] is called repeatedly from a single task. Each
//! call polls the link health check, takes a sample when the sample interval
//! has elapsed and runs a prediction when the prediction interval has
//! elapsed. Because the prediction interval is a whole multiple of the sample
//! interval, the sample for a given instant is always taken before the
//! prediction that reads it.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::aggregation::{DEFAULT_WINDOW_LEN, WindowAggregator};
use crate::classifier::{Classifier, Prediction, PredictionHistogram, WeatherClass};
use crate::clock::{Clock, is_due};
use crate::config::PipelineConfig;
use crate::delivery::{DeliveryOutcome, DeliveryStats, Reading, Sink};
use crate::link::{ConnectivityManager, LinkDriver};
use crate::metrics::{AirQuality, LightCondition};
use crate::scaling::FeatureScaler;
use crate::sensors::SensorSource;
use crate::status::StatusSink;

/// What the pipeline needs from the link: availability and a health poll.
pub trait LinkMonitor {
    fn is_available(&self) -> bool;

    fn poll(&mut self) -> impl Future<Output = ()>;
}

impl<D, C, W, S> LinkMonitor for ConnectivityManager<D, C, W, S>
where
    D: LinkDriver,
    C: Clock,
    W: DelayNs,
    S: StatusSink,
{
    fn is_available(&self) -> bool {
        ConnectivityManager::is_available(self)
    }

    async fn poll(&mut self) {
        self.update().await
    }
}

/// Result of a single [`DeliveryPipeline::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: bool,
    pub prediction: Option<Prediction>,
}

pub struct DeliveryPipeline<S, K, L, P, B, C, const N: usize = DEFAULT_WINDOW_LEN> {
    sensor: S,
    classifier: K,
    link: L,
    primary: P,
    secondary: B,
    clock: C,
    config: PipelineConfig,
    scaler: FeatureScaler,
    aggregator: WindowAggregator<N>,
    histogram: PredictionHistogram,
    started_at: Instant,
    last_sample: Option<Instant>,
    last_prediction: Instant,
    readings: u32,
    sensor_errors: u32,
    offline_predictions: u32,
    last_reading: Option<Reading>,
}

impl<S, K, L, P, B, C, const N: usize> DeliveryPipeline<S, K, L, P, B, C, N>
where
    S: SensorSource,
    K: Classifier,
    L: LinkMonitor,
    P: Sink,
    B: Sink,
    C: Clock,
{
    pub fn new(
        sensor: S,
        classifier: K,
        link: L,
        primary: P,
        secondary: B,
        clock: C,
        config: PipelineConfig,
    ) -> Self {
        let now = clock.now();
        Self {
            sensor,
            classifier,
            link,
            primary,
            secondary,
            clock,
            config,
            scaler: FeatureScaler::TRAINING,
            aggregator: WindowAggregator::new(),
            histogram: PredictionHistogram::new(),
            started_at: now,
            last_sample: None,
            last_prediction: now,
            readings: 0,
            sensor_errors: 0,
            offline_predictions: 0,
            last_reading: None,
        }
    }

    /// Use different scaling bounds than the training set defaults.
    pub fn with_scaler(mut self, scaler: FeatureScaler) -> Self {
        self.scaler = scaler;
        self
    }

    /// Reset counters, the histogram and the window, and restart both
    /// timers. The first prediction follows one full prediction interval
    /// later.
    pub fn start(&mut self) {
        let now = self.clock.now();
        self.started_at = now;
        self.last_sample = None;
        self.last_prediction = now;
        self.readings = 0;
        self.sensor_errors = 0;
        self.offline_predictions = 0;
        self.last_reading = None;
        self.histogram.reset();
        self.aggregator.reset();

        info!(
            "pipeline started: sample every {} ms, predict every {} ms over {} samples",
            self.config.sample_interval_ms, self.config.predict_interval_ms, N
        );
    }

    /// Log a run summary.
    pub fn stop(&self) {
        let runtime = self.clock.now().saturating_duration_since(self.started_at);
        info!("pipeline stopped after {} s", runtime.as_secs());
        info!("  readings:     {}", self.readings);
        info!("  sensor errors: {}", self.sensor_errors);
        info!("  predictions:  {}", self.histogram.total());
        info!("  offline:      {}", self.offline_predictions);
        log_sink_summary(self.primary.name(), self.primary.stats());
        log_sink_summary(self.secondary.name(), self.secondary.stats());

        if self.histogram.total() > 0 {
            info!("  class distribution:");
            for class in WeatherClass::ALL {
                info!(
                    "    {:<7} {:>5} ({:.1}%)",
                    class.label(),
                    self.histogram.count(class),
                    self.histogram.share(class)
                );
            }
        }
    }

    /// Run whatever is due at the current instant.
    pub async fn tick(&mut self) -> TickReport {
        self.link.poll().await;

        let now = self.clock.now();
        let mut report = TickReport::default();

        if is_due(now, self.last_sample, self.config.sample_interval()) {
            self.last_sample = Some(now);
            report.sampled = self.sample_once().await;
        }

        if is_due(now, Some(self.last_prediction), self.config.predict_interval()) {
            self.last_prediction = now;
            report.prediction = Some(self.predict_once(now).await);
        }

        report
    }

    /// Earliest instant at which [`Self::tick`] has work to do
    pub fn next_due(&self) -> Instant {
        let next_prediction = self.last_prediction + self.config.predict_interval();
        match self.last_sample {
            Some(last) => (last + self.config.sample_interval()).min(next_prediction),
            None => self.clock.now(),
        }
    }

    async fn sample_once(&mut self) -> bool {
        match self.sensor.read().await {
            Ok(sample) => {
                self.aggregator.sample(&sample);
                self.readings = self.readings.saturating_add(1);
                debug!("sample #{}: {:?}", self.readings, sample);
                true
            }
            Err(e) => {
                self.sensor_errors = self.sensor_errors.saturating_add(1);
                error!("sensor read failed, skipping sample: {}", e);
                false
            }
        }
    }

    async fn predict_once(&mut self, now: Instant) -> Prediction {
        let averages = self.aggregator.average();
        let features = self.scaler.scale_sample(&averages);

        let started = self.clock.now();
        let class = self.classifier.classify(&features);
        let inference_time = self.clock.now().saturating_duration_since(started);

        let prediction = Prediction {
            class,
            inference_time,
        };
        self.histogram.record(class);

        info!(
            "prediction #{}: {} ({} us)",
            self.histogram.total(),
            class.label(),
            inference_time.as_micros()
        );
        info!(
            "  T {:.2} C | H {:.2} % | P {:.2} hPa | L {:.1} lux ({}) | G {:.0} ppm ({})",
            averages.temperature_c,
            averages.humidity_pct,
            averages.pressure_pa / 100.0,
            averages.lux,
            LightCondition::assess(averages.lux).label(),
            averages.gas_ppm,
            AirQuality::assess(averages.gas_ppm).label()
        );
        debug!("  features {:?}", features.as_array());

        let reading = Reading {
            averages,
            prediction,
            timestamp_secs: now.as_secs(),
            taken_at: now,
        };
        self.last_reading = Some(reading);

        if !self.link.is_available() {
            self.offline_predictions = self.offline_predictions.saturating_add(1);
            warn!("link unavailable, prediction not delivered");
            return prediction;
        }

        deliver(&mut self.primary, &reading).await;
        deliver(&mut self.secondary, &reading).await;

        prediction
    }

    pub fn histogram(&self) -> &PredictionHistogram {
        &self.histogram
    }

    pub fn readings(&self) -> u32 {
        self.readings
    }

    pub fn sensor_errors(&self) -> u32 {
        self.sensor_errors
    }

    /// Predictions made while the link was unavailable
    pub fn offline_predictions(&self) -> u32 {
        self.offline_predictions
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last_reading.as_ref()
    }

    pub fn runtime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    pub fn aggregator(&self) -> &WindowAggregator<N> {
        &self.aggregator
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &B {
        &self.secondary
    }

    pub fn secondary_mut(&mut self) -> &mut B {
        &mut self.secondary
    }
}

async fn deliver<T: Sink>(sink: &mut T, reading: &Reading) {
    match sink.deliver(reading).await {
        Ok(DeliveryOutcome::Delivered) => debug!("{}: delivered", sink.name()),
        Ok(DeliveryOutcome::Skipped) => debug!("{}: skipped", sink.name()),
        Err(e) => warn!("{}: delivery failed: {}", sink.name(), e),
    }
}

fn log_sink_summary(name: &str, stats: DeliveryStats) {
    info!(
        "  {:<8} {} ok / {} failed of {} ({:.1}%)",
        name,
        stats.successes,
        stats.failures,
        stats.attempts,
        stats.success_rate()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CentroidClassifier;
    use crate::sensors::Sample;
    use crate::testing::{CountingClassifier, FixedLink, RecordingSink, ScriptedSensor, VirtualClock};
    use embassy_futures::block_on;

    type TestPipeline = DeliveryPipeline<
        ScriptedSensor,
        CountingClassifier<CentroidClassifier>,
        FixedLink,
        RecordingSink,
        RecordingSink,
        VirtualClock,
    >;

    struct Rig {
        clock: VirtualClock,
        link: FixedLink,
        primary: RecordingSink,
        secondary: RecordingSink,
        sensor: ScriptedSensor,
        classifier: CountingClassifier<CentroidClassifier>,
        pipeline: TestPipeline,
    }

    fn rig() -> Rig {
        let clock = VirtualClock::new();
        let link = FixedLink::new(true);
        let primary = RecordingSink::new("primary");
        let secondary = RecordingSink::new("backup");
        let sensor = ScriptedSensor::constant(Sample::new(22.0, 50.0, 99_000.0, 300.0, 500.0));
        let classifier = CountingClassifier::new(CentroidClassifier::new());
        let mut pipeline = DeliveryPipeline::new(
            sensor.clone(),
            classifier.clone(),
            link.clone(),
            primary.clone(),
            secondary.clone(),
            clock.clone(),
            PipelineConfig::default(),
        );
        pipeline.start();
        Rig {
            clock,
            link,
            primary,
            secondary,
            sensor,
            classifier,
            pipeline,
        }
    }

    fn run_seconds(rig: &mut Rig, seconds: u64) -> u32 {
        let mut predictions = 0;
        for _ in 0..seconds {
            if block_on(rig.pipeline.tick()).prediction.is_some() {
                predictions += 1;
            }
            rig.clock.advance(Duration::from_secs(1));
        }
        predictions
    }

    #[test]
    fn samples_every_second_predicts_every_fifteen() {
        let mut rig = rig();

        // t = 0..=30 s
        let predictions = run_seconds(&mut rig, 31);

        assert_eq!(rig.pipeline.readings(), 31);
        assert_eq!(predictions, 2);
        assert_eq!(rig.classifier.calls(), 2);
        assert_eq!(rig.primary.deliveries().len(), 2);
        assert_eq!(rig.secondary.deliveries().len(), 2);
        assert_eq!(rig.primary.deliveries()[0].timestamp_secs, 15);
    }

    #[test]
    fn first_prediction_waits_a_full_interval() {
        let mut rig = rig();

        assert_eq!(run_seconds(&mut rig, 15), 0);
        assert_eq!(rig.pipeline.next_due(), Instant::from_secs(15));
    }

    #[test]
    fn offline_predictions_are_counted_not_delivered() {
        let mut rig = rig();
        rig.link.set_available(false);

        run_seconds(&mut rig, 16);

        assert_eq!(rig.pipeline.histogram().total(), 1);
        assert_eq!(rig.pipeline.offline_predictions(), 1);
        assert!(rig.primary.deliveries().is_empty());
        assert!(rig.secondary.deliveries().is_empty());
        assert!(rig.link.polls() >= 16);
    }

    #[test]
    fn failing_primary_does_not_skip_secondary() {
        let mut rig = rig();
        rig.primary.set_failing(true);

        run_seconds(&mut rig, 16);

        assert_eq!(rig.primary.deliveries().len(), 1);
        assert_eq!(rig.primary.stats().failures, 1);
        assert_eq!(rig.secondary.deliveries().len(), 1);
        assert_eq!(rig.secondary.stats().successes, 1);
    }

    #[test]
    fn sensor_failure_skips_the_sample() {
        let mut rig = rig();
        rig.sensor.fail_next(3);

        run_seconds(&mut rig, 10);

        assert_eq!(rig.pipeline.readings(), 7);
        assert_eq!(rig.pipeline.sensor_errors(), 3);
        assert_eq!(rig.pipeline.aggregator().samples_seen(), 7);
    }

    #[test]
    fn restart_resets_histogram_and_window() {
        let mut rig = rig();
        run_seconds(&mut rig, 16);
        assert_eq!(rig.pipeline.histogram().total(), 1);

        rig.pipeline.start();

        assert_eq!(rig.pipeline.histogram().total(), 0);
        assert_eq!(rig.pipeline.readings(), 0);
        assert_eq!(rig.pipeline.aggregator().samples_seen(), 0);
        rig.pipeline.stop();
    }
}
