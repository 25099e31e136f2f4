use itertools::Itertools;
use std::fmt;
use thiserror::Error;

use super::threshold::ThresholdSpec;

/// Canonically ordered channel pair, `x < y`, both 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelPair {
    pub x: usize,
    pub y: usize,
}

impl fmt::Display for ChannelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

/// Every pair `(x, y)` with `x < y` drawn from `channels`.
pub fn channel_pairs(channels: &[usize]) -> Vec<ChannelPair> {
    channels
        .iter()
        .cloned()
        .sorted()
        .dedup()
        .tuple_combinations()
        .map(|(x, y)| ChannelPair { x, y })
        .collect()
}

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("at least two channels must be selected")]
    TooFewChannels,
    #[error("channels are numbered from 1")]
    ZeroChannel,
    #[error("channel {0} selected more than once")]
    DuplicateChannel(usize),
    #[error("{nmethods} threshold methods given for {nchannels} channels")]
    MethodCount { nchannels: usize, nmethods: usize },
}

/// The analyzed channels with their threshold methods, fixed for a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSelection {
    channels: Vec<(usize, ThresholdSpec)>,
}

impl ChannelSelection {
    /// A single method applies to every channel; otherwise methods pair up
    /// with channels in the order given.
    pub fn new(channels: &[usize], methods: &[ThresholdSpec]) -> Result<Self, SelectionError> {
        if channels.len() < 2 {
            return Err(SelectionError::TooFewChannels);
        }
        if channels.contains(&0) {
            return Err(SelectionError::ZeroChannel);
        }
        if let Some(dup) = channels.iter().duplicates().next() {
            return Err(SelectionError::DuplicateChannel(*dup));
        }

        let methods: Vec<ThresholdSpec> = match methods.len() {
            1 => vec![methods[0]; channels.len()],
            n if n == channels.len() => methods.to_vec(),
            n => {
                return Err(SelectionError::MethodCount {
                    nchannels: channels.len(),
                    nmethods: n,
                })
            }
        };

        let channels = channels
            .iter()
            .cloned()
            .zip(methods)
            .sorted_by_key(|(c, _)| *c)
            .collect();

        Ok(ChannelSelection { channels })
    }

    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.channels.iter().map(|(c, _)| *c)
    }

    pub fn methods(&self) -> &[(usize, ThresholdSpec)] {
        &self.channels
    }

    pub fn method(&self, channel: usize) -> Option<ThresholdSpec> {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, m)| *m)
    }

    pub fn pairs(&self) -> Vec<ChannelPair> {
        channel_pairs(&self.channels().collect::<Vec<_>>())
    }

    pub fn max_channel(&self) -> usize {
        self.channels().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coloc::threshold::ThresholdMethod;

    #[test]
    fn test_pairs_of_three() {
        let pairs = channel_pairs(&[5, 2, 3]);
        assert_eq!(
            pairs,
            vec![
                ChannelPair { x: 2, y: 3 },
                ChannelPair { x: 2, y: 5 },
                ChannelPair { x: 3, y: 5 },
            ]
        );
        assert_eq!(pairs[1].to_string(), "2-5");
    }

    #[test]
    fn test_pairs_of_one() {
        assert!(channel_pairs(&[4]).is_empty());
    }

    #[test]
    fn test_selection_keeps_method_with_channel() {
        let otsu = ThresholdSpec::Auto(ThresholdMethod::Otsu);
        let selection = ChannelSelection::new(&[3, 1], &[otsu, ThresholdSpec::None]).unwrap();
        assert_eq!(selection.channels().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(selection.method(1), Some(ThresholdSpec::None));
        assert_eq!(selection.method(3), Some(otsu));
        assert_eq!(selection.method(2), None);
        assert_eq!(selection.max_channel(), 3);
        assert_eq!(selection.pairs(), vec![ChannelPair { x: 1, y: 3 }]);
    }

    #[test]
    fn test_single_method_broadcasts() {
        let mean = ThresholdSpec::Auto(ThresholdMethod::Mean);
        let selection = ChannelSelection::new(&[1, 2, 4], &[mean]).unwrap();
        assert!(selection.methods().iter().all(|(_, m)| *m == mean));
    }

    #[test]
    fn test_invalid_selections() {
        let mean = ThresholdSpec::Auto(ThresholdMethod::Mean);
        assert_eq!(
            ChannelSelection::new(&[1], &[mean]),
            Err(SelectionError::TooFewChannels)
        );
        assert_eq!(
            ChannelSelection::new(&[0, 1], &[mean]),
            Err(SelectionError::ZeroChannel)
        );
        assert_eq!(
            ChannelSelection::new(&[2, 2], &[mean]),
            Err(SelectionError::DuplicateChannel(2))
        );
        assert_eq!(
            ChannelSelection::new(&[1, 2, 3], &[mean, mean]),
            Err(SelectionError::MethodCount {
                nchannels: 3,
                nmethods: 2
            })
        );
    }
}
