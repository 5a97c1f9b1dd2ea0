use radical_common::{EventId, RunId, Sample, TriggerId};

/// One triggered readout of every digitiser module.
///
/// `amplitude` and `time` are the flat arrays described by the
/// [`ChannelAddressMap`](crate::channels::ChannelAddressMap) of the run.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub run: RunId,
    /// Event numbers assigned by the two readout boards.
    pub event0: EventId,
    pub event1: EventId,
    pub trigger: TriggerId,
    pub amplitude: Vec<Sample>,
    pub time: Vec<Sample>,
}
