//! Capturing metrics emitted by `packetwire` during a test.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Debugging recorder paired with its snapshotter.
///
/// Install the recorder for the duration of a closure with
/// `metrics::with_local_recorder(capture.recorder(), ..)` or globally with
/// [`DebuggingRecorder::install`], then inspect values through
/// [`counter_value`].
pub struct MetricsCapture {
    recorder: DebuggingRecorder,
    snapshotter: Snapshotter,
}

impl MetricsCapture {
    /// Create a fresh recorder.
    #[must_use]
    pub fn new() -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        Self {
            recorder,
            snapshotter,
        }
    }

    /// The recorder to install.
    #[must_use]
    pub fn recorder(&self) -> &DebuggingRecorder { &self.recorder }

    /// The snapshotter reading the recorder's values.
    #[must_use]
    pub fn snapshotter(&self) -> &Snapshotter { &self.snapshotter }
}

impl Default for MetricsCapture {
    fn default() -> Self { Self::new() }
}

/// Sum of every counter named `name` whose labels include all of `labels`.
#[must_use]
pub fn counter_value(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == *k && label.value() == *v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}
