use std::sync::{Arc, Mutex};

use bytes::Bytes;
use rstest::rstest;

use super::*;
use crate::packet::tests::Ping;

type Trace = Arc<Mutex<Vec<String>>>;

struct Recorder {
    label: &'static str,
    trace: Trace,
}

impl Recorder {
    fn push(&self, event: &str) {
        self.trace
            .lock()
            .expect("trace lock")
            .push(format!("{}:{event}", self.label));
    }
}

impl Stage for Recorder {
    fn inbound_frame(&mut self, _frame: &Bytes) { self.push("in-frame"); }

    fn outbound_frame(&mut self, _frame: &Bytes) { self.push("out-frame"); }

    fn inbound_packet(&mut self, _envelope: &Envelope) { self.push("in-packet"); }

    fn outbound_packet(&mut self, _envelope: &Envelope) { self.push("out-packet"); }
}

fn recorder(label: &'static str, trace: &Trace) -> impl Fn() -> Recorder + Send + Sync + 'static {
    let trace = Arc::clone(trace);
    move || Recorder {
        label,
        trace: Arc::clone(&trace),
    }
}

#[rstest]
#[case::first(Placement::First, &["ext", "packet-framer", "packet-codec", "packet-handler"])]
#[case::last(Placement::Last, &["packet-framer", "packet-codec", "packet-handler", "ext"])]
#[case::before_codec(
    Placement::Before(BaseStage::Codec),
    &["packet-framer", "ext", "packet-codec", "packet-handler"]
)]
#[case::after_codec(
    Placement::After(BaseStage::Codec),
    &["packet-framer", "packet-codec", "ext", "packet-handler"]
)]
fn placement_resolves_relative_to_base(#[case] placement: Placement, #[case] expected: &[&str]) {
    let trace = Trace::default();
    let pipeline = PipelineBuilder::default()
        .stage("ext", placement, recorder("ext", &trace))
        .build();
    assert_eq!(pipeline.names(), expected);
}

#[test]
fn later_first_stage_becomes_head() {
    let trace = Trace::default();
    let pipeline = PipelineBuilder::default()
        .stage("a", Placement::First, recorder("a", &trace))
        .stage("b", Placement::First, recorder("b", &trace))
        .build();
    assert_eq!(pipeline.names()[..2], ["b", "a"]);
}

#[test]
fn callbacks_follow_position_and_direction() {
    let trace = Trace::default();
    let mut pipeline = PipelineBuilder::default()
        .stage("head", Placement::First, recorder("head", &trace))
        .stage("framed", Placement::After(BaseStage::Framer), recorder("framed", &trace))
        .stage("tail", Placement::Last, recorder("tail", &trace))
        .build();
    let frame = Bytes::from_static(b"x");
    let envelope = Envelope::new(Ping { value: 1 });

    pipeline.inbound_frame(&frame);
    pipeline.inbound_packet(&envelope);
    pipeline.outbound_packet(&envelope);
    pipeline.outbound_frame(&frame);

    assert_eq!(*trace.lock().expect("trace lock"), vec![
        "head:in-frame",
        "framed:in-frame",
        "tail:in-packet",
        "tail:out-packet",
        "framed:out-frame",
        "head:out-frame",
    ]);
}

#[test]
fn each_build_gets_fresh_stages() {
    let stats = Arc::new(TrafficStats::default());
    let shared = Arc::clone(&stats);
    let builder = PipelineBuilder::default().stage("traffic", Placement::First, move || {
        TrafficCounter::new(Arc::clone(&shared))
    });
    let mut first = builder.build();
    let mut second = builder.build();
    first.inbound_frame(&Bytes::from_static(b"abc"));
    second.outbound_frame(&Bytes::from_static(b"de"));
    assert_eq!(stats.frames_in(), 1);
    assert_eq!(stats.bytes_in(), 3);
    assert_eq!(stats.frames_out(), 1);
    assert_eq!(stats.bytes_out(), 2);
}

#[test]
fn builder_is_append_only_across_clones() {
    let trace = Trace::default();
    let base = PipelineBuilder::default().stage("a", Placement::Last, recorder("a", &trace));
    let built_before = base.build();
    let extended = base.clone().stage("b", Placement::Last, recorder("b", &trace));
    assert_eq!(built_before.names().len(), 4);
    assert_eq!(extended.build().names().len(), 5);
    assert_eq!(base.len(), 1);
}
