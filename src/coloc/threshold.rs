use std::fmt;
use std::str::FromStr;

use log::debug;
use ndarray::Array3;
use thiserror::Error;

use super::autothreshold;
use super::volume::ChannelVolume;

const FLOAT_BINS: usize = 256;
const MAX_INTEGER_LEVELS: usize = 256;

/// Value of foreground voxels in a binarized volume.
pub const FOREGROUND: f32 = 255.0;

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("cannot threshold an empty volume")]
    EmptyVolume,
    #[error("{method} found no threshold")]
    NoThreshold { method: ThresholdMethod },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdMethod {
    Default,
    Huang,
    Intermodes,
    IsoData,
    Li,
    MaxEntropy,
    Mean,
    MinError,
    Minimum,
    Moments,
    Otsu,
    Percentile,
    RenyiEntropy,
    Shanbhag,
    Triangle,
    Yen,
}

impl ThresholdMethod {
    pub const ALL: [ThresholdMethod; 16] = [
        ThresholdMethod::Default,
        ThresholdMethod::Huang,
        ThresholdMethod::Intermodes,
        ThresholdMethod::IsoData,
        ThresholdMethod::Li,
        ThresholdMethod::MaxEntropy,
        ThresholdMethod::Mean,
        ThresholdMethod::MinError,
        ThresholdMethod::Minimum,
        ThresholdMethod::Moments,
        ThresholdMethod::Otsu,
        ThresholdMethod::Percentile,
        ThresholdMethod::RenyiEntropy,
        ThresholdMethod::Shanbhag,
        ThresholdMethod::Triangle,
        ThresholdMethod::Yen,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdMethod::Default => "Default",
            ThresholdMethod::Huang => "Huang",
            ThresholdMethod::Intermodes => "Intermodes",
            ThresholdMethod::IsoData => "IsoData",
            ThresholdMethod::Li => "Li",
            ThresholdMethod::MaxEntropy => "MaxEntropy",
            ThresholdMethod::Mean => "Mean",
            ThresholdMethod::MinError => "MinError",
            ThresholdMethod::Minimum => "Minimum",
            ThresholdMethod::Moments => "Moments",
            ThresholdMethod::Otsu => "Otsu",
            ThresholdMethod::Percentile => "Percentile",
            ThresholdMethod::RenyiEntropy => "RenyiEntropy",
            ThresholdMethod::Shanbhag => "Shanbhag",
            ThresholdMethod::Triangle => "Triangle",
            ThresholdMethod::Yen => "Yen",
        }
    }

    /// Index of the last background bin of `histogram`.
    pub fn compute(&self, histogram: &[u64]) -> Option<usize> {
        match self {
            ThresholdMethod::Default => autothreshold::default_isodata(histogram),
            ThresholdMethod::Huang => autothreshold::huang(histogram),
            ThresholdMethod::Intermodes => autothreshold::intermodes(histogram),
            ThresholdMethod::IsoData => autothreshold::isodata(histogram),
            ThresholdMethod::Li => autothreshold::li(histogram),
            ThresholdMethod::MaxEntropy => autothreshold::max_entropy(histogram),
            ThresholdMethod::Mean => autothreshold::mean(histogram),
            ThresholdMethod::MinError => autothreshold::min_error(histogram),
            ThresholdMethod::Minimum => autothreshold::minimum(histogram),
            ThresholdMethod::Moments => autothreshold::moments(histogram),
            ThresholdMethod::Otsu => autothreshold::otsu(histogram),
            ThresholdMethod::Percentile => autothreshold::percentile(histogram),
            ThresholdMethod::RenyiEntropy => autothreshold::renyi_entropy(histogram),
            ThresholdMethod::Shanbhag => autothreshold::shanbhag(histogram),
            ThresholdMethod::Triangle => autothreshold::triangle(histogram),
            ThresholdMethod::Yen => autothreshold::yen(histogram),
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a channel is thresholded. `None` excludes the channel from the
/// thresholded analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdSpec {
    None,
    Auto(ThresholdMethod),
}

impl fmt::Display for ThresholdSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdSpec::None => f.write_str("None"),
            ThresholdSpec::Auto(method) => method.fmt(f),
        }
    }
}

impl FromStr for ThresholdSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("none") {
            return Ok(ThresholdSpec::None);
        }
        if name.eq_ignore_ascii_case("minerror(i)") {
            return Ok(ThresholdSpec::Auto(ThresholdMethod::MinError));
        }
        ThresholdMethod::ALL
            .iter()
            .find(|method| method.name().eq_ignore_ascii_case(name))
            .map(|&method| ThresholdSpec::Auto(method))
            .ok_or_else(|| format!("unknown threshold method: {}", s))
    }
}

/// Histogram of every voxel of a volume, with the mapping from bins back to
/// intensities.
#[derive(Debug)]
pub struct StackHistogram {
    pub counts: Vec<u64>,
    pub min: f32,
    pub max: f32,
    bin_width: f32,
    integer_bins: bool,
}

impl StackHistogram {
    pub fn from_values<I: IntoIterator<Item = f32> + Clone>(values: I) -> Option<Self> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut integral = true;
        let mut any = false;
        for v in values.clone() {
            any = true;
            min = min.min(v);
            max = max.max(v);
            integral &= v.fract() == 0.0;
        }
        if !any {
            return None;
        }

        let integer_bins = integral && (max - min) < MAX_INTEGER_LEVELS as f32;
        let (nbins, bin_width) = if integer_bins {
            ((max - min) as usize + 1, 1.0)
        } else {
            (FLOAT_BINS, (max - min) / FLOAT_BINS as f32)
        };

        let mut counts = vec![0; nbins];
        for v in values {
            let bin = if integer_bins {
                (v - min) as usize
            } else if bin_width > 0.0 {
                (((v - min) / bin_width) as usize).min(nbins - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }

        Some(StackHistogram {
            counts,
            min,
            max,
            bin_width,
            integer_bins,
        })
    }

    pub fn is_uniform(&self) -> bool {
        self.min == self.max
    }

    /// Largest intensity that falls in bins `<= bin`.
    pub fn cutoff(&self, bin: usize) -> f32 {
        if self.integer_bins {
            self.min + bin as f32
        } else {
            (self.min + (bin + 1) as f32 * self.bin_width).min(self.max)
        }
    }
}

#[derive(Debug)]
pub struct Threshold {
    pub cutoff: f32,
    pub binarized: ChannelVolume,
}

/// Derive a global cutoff for `volume` and binarize it. The input is only
/// read; the binarized volume is a new allocation.
pub fn threshold(
    volume: &ChannelVolume,
    spec: ThresholdSpec,
) -> Result<Option<Threshold>, ThresholdError> {
    let method = match spec {
        ThresholdSpec::None => return Ok(None),
        ThresholdSpec::Auto(method) => method,
    };

    let data = volume.data();
    let histogram =
        StackHistogram::from_values(data.iter().cloned()).ok_or(ThresholdError::EmptyVolume)?;

    let cutoff = if histogram.is_uniform() {
        histogram.min
    } else {
        let bin = method
            .compute(&histogram.counts)
            .ok_or(ThresholdError::NoThreshold { method })?;
        histogram.cutoff(bin)
    };

    debug!(
        "channel {} {} threshold {} over [{}, {}]",
        volume.channel(),
        method,
        cutoff,
        histogram.min,
        histogram.max
    );

    let binarized: Array3<f32> = data.mapv(|v| if v > cutoff { FOREGROUND } else { 0.0 });

    Ok(Some(Threshold {
        cutoff,
        binarized: ChannelVolume::new(volume.channel(), binarized),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn auto(method: ThresholdMethod) -> ThresholdSpec {
        ThresholdSpec::Auto(method)
    }

    #[test]
    fn test_parse_methods() {
        assert_eq!("None".parse::<ThresholdSpec>(), Ok(ThresholdSpec::None));
        assert_eq!("otsu".parse::<ThresholdSpec>(), Ok(auto(ThresholdMethod::Otsu)));
        assert_eq!(
            "MinError(I)".parse::<ThresholdSpec>(),
            Ok(auto(ThresholdMethod::MinError))
        );
        assert!("Bogus".parse::<ThresholdSpec>().is_err());
        for method in ThresholdMethod::ALL {
            assert_eq!(method.to_string().parse::<ThresholdSpec>(), Ok(auto(method)));
        }
    }

    #[test]
    fn test_none_short_circuits() {
        let volume = ChannelVolume::new(1, Array3::zeros((0, 0, 0)));
        assert!(threshold(&volume, ThresholdSpec::None).unwrap().is_none());
    }

    #[test]
    fn test_empty_volume_is_an_error() {
        let volume = ChannelVolume::new(1, Array3::zeros((0, 4, 4)));
        assert_eq!(
            threshold(&volume, auto(ThresholdMethod::Mean)).unwrap_err(),
            ThresholdError::EmptyVolume
        );
    }

    #[test]
    fn test_uniform_volume_thresholds_at_its_value() {
        let volume = ChannelVolume::new(2, Array3::from_elem((3, 10, 10), 100.0));
        for method in ThresholdMethod::ALL {
            let t = threshold(&volume, auto(method)).unwrap().unwrap();
            assert_eq!(t.cutoff, 100.0);
            assert!(t.binarized.data().iter().all(|&v| v == 0.0));
            assert_eq!(t.binarized.channel(), 2);
        }
    }

    #[test]
    fn test_mean_of_two_levels() {
        let mut data = Array3::<f32>::zeros((1, 10, 10));
        data.slice_mut(ndarray::s![.., 5.., ..]).fill(200.0);
        let volume = ChannelVolume::new(1, data);
        let t = threshold(&volume, auto(ThresholdMethod::Mean)).unwrap().unwrap();
        assert_eq!(t.cutoff, 100.0);
        assert_eq!(
            t.binarized.data().iter().filter(|&&v| v == FOREGROUND).count(),
            50
        );
    }

    #[test]
    fn test_otsu_separates_noisy_populations() {
        let mut rng = StdRng::seed_from_u64(17);
        let data = Array3::from_shape_fn((2, 20, 20), |(_, y, _)| {
            let base = if y < 10 { 10.0 } else { 200.0 };
            base + rng.random_range(-5.0..5.0f32).round()
        });
        let volume = ChannelVolume::new(1, data);
        let t = threshold(&volume, auto(ThresholdMethod::Otsu)).unwrap().unwrap();
        assert!(t.cutoff >= 10.0 && t.cutoff < 195.0, "cutoff {}", t.cutoff);
        assert_eq!(
            t.binarized.data().iter().filter(|&&v| v == FOREGROUND).count(),
            2 * 10 * 20
        );
    }

    #[test]
    fn test_float_data_uses_fixed_bins() {
        let values = vec![0.0f32, 0.25, 0.5, 1.0];
        let histogram = StackHistogram::from_values(values.iter().cloned()).unwrap();
        assert_eq!(histogram.counts.len(), 256);
        assert_eq!(histogram.counts[255], 1);
        assert_eq!(histogram.cutoff(255), 1.0);
        assert!((histogram.cutoff(127) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_wide_integer_range_uses_fixed_bins() {
        let values = vec![0.0f32, 1000.0, 4095.0];
        let histogram = StackHistogram::from_values(values.iter().cloned()).unwrap();
        assert_eq!(histogram.counts.len(), 256);
        assert_eq!(histogram.counts.iter().sum::<u64>(), 3);
    }
}
