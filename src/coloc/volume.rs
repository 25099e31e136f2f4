use ndarray::{Array3, Array4, ArrayView2, ArrayView3, Axis};

/// Multi-channel image stack stored as `[channel, z, y, x]`.
#[derive(Clone, Debug)]
pub struct MultiChannelVolume {
    data: Array4<f32>,
}

impl MultiChannelVolume {
    pub fn new(data: Array4<f32>) -> Self {
        MultiChannelVolume { data }
    }

    pub fn from_channels(channels: &[Array3<f32>]) -> Self {
        let views: Vec<ArrayView3<f32>> = channels.iter().map(|c| c.view()).collect();
        let data = ndarray::stack(Axis(0), &views)
            .unwrap_or_else(|_| panic!("channels of a volume must share one shape"));
        MultiChannelVolume { data }
    }

    pub fn nchannels(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(3))
    }

    /// Full-frame plane of 1-based `channel` at 0-based slice `z`.
    pub fn plane(&self, channel: usize, z: usize) -> ArrayView2<f32> {
        self.data.index_axis(Axis(0), channel - 1).index_axis_move(Axis(0), z)
    }

    pub fn channel(&self, channel: usize) -> ArrayView3<f32> {
        self.data.index_axis(Axis(0), channel - 1)
    }
}

/// Single-channel `[z, y, x]` volume tagged with its 1-based channel index.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelVolume {
    channel: usize,
    data: Array3<f32>,
}

impl ChannelVolume {
    pub fn new(channel: usize, data: Array3<f32>) -> Self {
        ChannelVolume { channel, data }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn view(&self) -> ArrayView3<f32> {
        self.data.view()
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn max_value(&self) -> Option<f32> {
        self.data.iter().cloned().fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) => Some(m.max(v)),
        })
    }
}
