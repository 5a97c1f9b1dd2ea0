//! Locates logical digitiser channels inside the flat per-event sample arrays.
//!
//! Each event carries one amplitude array holding `samples_per_channel`
//! samples for every channel of every module, and one time array holding a
//! time base for every group of `channels_per_group` consecutive channels.
//! A channel is named by `(module, group, channel)`; the group selects a
//! block of `channels_per_group` channels and `channel` counts on from the
//! start of that block, so `(m, 0, 9)` and `(m, 1, 0)` name the same slot.
use crate::parameters::DigitiserLayout;
use std::{
    fmt::{Display, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ChannelError {
    #[error(
        "Layout of {channels_per_module} channels per module cannot be split into groups of {channels_per_group}"
    )]
    InvalidLayout {
        channels_per_module: usize,
        channels_per_group: usize,
    },
    #[error("Module {module} out of range, only {num_modules} modules are read out")]
    ModuleOutOfRange { module: usize, num_modules: usize },
    #[error("Group {group} out of range, each module has {groups_per_module} groups")]
    GroupOutOfRange {
        group: usize,
        groups_per_module: usize,
    },
    #[error("Channel {channel} of group {group} lies beyond the {channels_per_module} channels of a module")]
    ChannelOutOfRange {
        group: usize,
        channel: usize,
        channels_per_module: usize,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ChannelParseError {
    #[error("Incorrect number of parameters in channel, expected pattern 'module,group,channel', got '{0}'")]
    Pattern(String),
    #[error("Invalid channel index: {0}")]
    Index(#[from] ParseIntError),
}

/// Logical address of one digitiser channel.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelAddress {
    pub module: usize,
    pub group: usize,
    pub channel: usize,
}

impl ChannelAddress {
    pub const fn new(module: usize, group: usize, channel: usize) -> Self {
        Self {
            module,
            group,
            channel,
        }
    }
}

impl Display for ChannelAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DRS{}/G{}/CH{}", self.module, self.group, self.channel)
    }
}

impl FromStr for ChannelAddress {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').map(str::trim).collect();
        match vals.as_slice() {
            [module, group, channel] => Ok(ChannelAddress {
                module: module.parse()?,
                group: group.parse()?,
                channel: channel.parse()?,
            }),
            _ => Err(ChannelParseError::Pattern(s.to_owned())),
        }
    }
}

/// Start of a channel's amplitude slice and of its time base slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOffsets {
    pub amplitude: usize,
    pub time: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelAddressMap {
    layout: DigitiserLayout,
    groups_per_module: usize,
}

impl ChannelAddressMap {
    pub fn new(layout: DigitiserLayout) -> Result<Self, ChannelError> {
        let groups_per_module = layout
            .channels_per_module
            .checked_div(layout.channels_per_group)
            .filter(|groups| groups * layout.channels_per_group == layout.channels_per_module)
            .ok_or(ChannelError::InvalidLayout {
                channels_per_module: layout.channels_per_module,
                channels_per_group: layout.channels_per_group,
            })?;
        Ok(Self {
            layout,
            groups_per_module,
        })
    }

    pub fn samples_per_channel(&self) -> usize {
        self.layout.samples_per_channel
    }

    /// Number of samples in the amplitude array of a complete event.
    pub fn amplitude_len(&self) -> usize {
        self.layout.samples_per_channel * self.layout.channels_per_module * self.layout.num_modules
    }

    /// Number of samples in the time array of a complete event.
    pub fn time_len(&self) -> usize {
        self.layout.samples_per_channel * self.groups_per_module * self.layout.num_modules
    }

    /// Returns the offsets of the amplitude and time slices of the given channel.
    pub fn locate(&self, address: ChannelAddress) -> Result<ChannelOffsets, ChannelError> {
        let DigitiserLayout {
            samples_per_channel,
            channels_per_module,
            channels_per_group,
            num_modules,
        } = self.layout;

        if address.module >= num_modules {
            return Err(ChannelError::ModuleOutOfRange {
                module: address.module,
                num_modules,
            });
        }
        if address.group >= self.groups_per_module {
            return Err(ChannelError::GroupOutOfRange {
                group: address.group,
                groups_per_module: self.groups_per_module,
            });
        }
        let slot = channels_per_group * address.group + address.channel;
        if slot >= channels_per_module {
            return Err(ChannelError::ChannelOutOfRange {
                group: address.group,
                channel: address.channel,
                channels_per_module,
            });
        }

        Ok(ChannelOffsets {
            amplitude: samples_per_channel * (channels_per_module * address.module + slot),
            time: samples_per_channel
                * (self.groups_per_module * address.module + slot / channels_per_group),
        })
    }

    /// Every channel of every module, addressed from the start of the module.
    pub fn all_channels(&self) -> impl Iterator<Item = ChannelAddress> + '_ {
        (0..self.layout.num_modules).flat_map(move |module| {
            (0..self.layout.channels_per_module)
                .map(move |channel| ChannelAddress::new(module, 0, channel))
        })
    }
}
