// Histogram based global thresholding methods.
//
// Every method takes a histogram and returns the index of the last background
// bin: voxels in bins `<= t` are background, voxels in bins `> t` foreground.
// `None` means the method could not settle on a threshold.

use std::f64;

const MAX_SMOOTHING_ITERATIONS: usize = 10000;
const MAX_REFINEMENT_ITERATIONS: usize = 1000;

fn partial_sum(data: &[u64], j: usize) -> f64 {
    data[..=j].iter().map(|&v| v as f64).sum()
}

fn partial_moment(data: &[u64], j: usize) -> f64 {
    data[..=j]
        .iter()
        .enumerate()
        .map(|(i, &v)| i as f64 * v as f64)
        .sum()
}

fn partial_second_moment(data: &[u64], j: usize) -> f64 {
    data[..=j]
        .iter()
        .enumerate()
        .map(|(i, &v)| (i * i) as f64 * v as f64)
        .sum()
}

fn total(data: &[u64]) -> f64 {
    data.iter().map(|&v| v as f64).sum()
}

fn checked_bin(t: i64, n: usize) -> Option<usize> {
    if t >= 0 && (t as usize) < n {
        Some(t as usize)
    } else {
        None
    }
}

fn normalized(data: &[u64]) -> Vec<f64> {
    let total = total(data);
    data.iter().map(|&v| v as f64 / total).collect()
}

// Cumulative normalized histogram and its complement, with the first and last
// bins where either is non-negligible.
struct Cumulative {
    norm: Vec<f64>,
    p1: Vec<f64>,
    p2: Vec<f64>,
    first_bin: usize,
    last_bin: usize,
}

impl Cumulative {
    fn new(data: &[u64]) -> Cumulative {
        let n = data.len();
        let norm = normalized(data);
        let mut p1 = vec![0.0; n];
        let mut p2 = vec![0.0; n];
        p1[0] = norm[0];
        p2[0] = 1.0 - p1[0];
        for i in 1..n {
            p1[i] = p1[i - 1] + norm[i];
            p2[i] = 1.0 - p1[i];
        }

        let first_bin = (0..n).find(|&i| p1[i].abs() >= f64::EPSILON).unwrap_or(0);
        let last_bin = (first_bin..n)
            .rev()
            .find(|&i| p2[i].abs() >= f64::EPSILON)
            .unwrap_or(n - 1);

        Cumulative {
            norm,
            p1,
            p2,
            first_bin,
            last_bin,
        }
    }
}

fn bimodal(y: &[f64]) -> bool {
    let mut modes = 0;
    for k in 1..y.len().saturating_sub(1) {
        if y[k - 1] < y[k] && y[k + 1] < y[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

/// Iterative intermeans variant used as the default method.
pub fn default_isodata(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let max_value = n - 1;
    let mut data = data.to_vec();
    // extreme bins are ignored
    data[0] = 0;
    data[max_value] = 0;

    let mut min = 0;
    while data[min] == 0 && min < max_value {
        min += 1;
    }
    let mut max = max_value;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        return Some(n / 2);
    }

    let mut moving = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for (i, &v) in data.iter().enumerate().take(moving + 1).skip(min) {
            sum1 += i as f64 * v as f64;
            sum2 += v as f64;
        }
        for (i, &v) in data.iter().enumerate().take(max + 1).skip(moving + 1) {
            sum3 += i as f64 * v as f64;
            sum4 += v as f64;
        }
        result = (sum1 / sum2 + sum3 / sum4) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving < max - 1) {
            break;
        }
    }

    checked_bin(result.round() as i64, n)
}

/// Huang's fuzzy thresholding, minimizing Shannon entropy of the membership.
pub fn huang(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let first_bin = data.iter().position(|&v| v != 0)?;
    let last_bin = (first_bin..n).rev().find(|&i| data[i] != 0).unwrap_or(first_bin);
    if last_bin == first_bin {
        return Some(first_bin);
    }

    let term = 1.0 / (last_bin - first_bin) as f64;

    let mut mu_0 = vec![0.0; n];
    let (mut sum_pix, mut num_pix) = (0.0, 0.0);
    for ih in first_bin..n {
        sum_pix += ih as f64 * data[ih] as f64;
        num_pix += data[ih] as f64;
        mu_0[ih] = sum_pix / num_pix;
    }

    let mut mu_1 = vec![0.0; n];
    let (mut sum_pix, mut num_pix) = (0.0, 0.0);
    for ih in (1..=last_bin).rev() {
        sum_pix += ih as f64 * data[ih] as f64;
        num_pix += data[ih] as f64;
        mu_1[ih - 1] = sum_pix / num_pix;
    }

    let fuzzy_entropy = |ih: usize, mu: f64| {
        let mu_x = 1.0 / (1.0 + term * (ih as f64 - mu).abs());
        if !(1e-06..=0.999999).contains(&mu_x) {
            0.0
        } else {
            data[ih] as f64 * (-mu_x * mu_x.ln() - (1.0 - mu_x) * (1.0 - mu_x).ln())
        }
    };

    let mut threshold = None;
    let mut min_ent = f64::MAX;
    for it in 0..n {
        let mut ent = 0.0;
        for ih in 0..=it {
            ent += fuzzy_entropy(ih, mu_0[it]);
        }
        for ih in (it + 1)..n {
            ent += fuzzy_entropy(ih, mu_1[it]);
        }
        if ent < min_ent {
            min_ent = ent;
            threshold = Some(it);
        }
    }

    threshold
}

/// Smooth until bimodal, then take the midpoint of the two peaks.
pub fn intermodes(data: &[u64]) -> Option<usize> {
    let n = data.len();
    if n < 3 {
        return None;
    }
    let mut histo: Vec<f64> = data.iter().map(|&v| v as f64).collect();

    let mut iter = 0;
    while !bimodal(&histo) {
        let (mut current, mut next) = (0.0, histo[0]);
        for i in 0..(n - 1) {
            let previous = current;
            current = next;
            next = histo[i + 1];
            histo[i] = (previous + current + next) / 3.0;
        }
        histo[n - 1] = (current + next) / 3.0;

        iter += 1;
        if iter > MAX_SMOOTHING_ITERATIONS {
            return None;
        }
    }

    let tt: usize = (1..(n - 1))
        .filter(|&i| histo[i - 1] < histo[i] && histo[i + 1] < histo[i])
        .sum();

    Some(tt / 2)
}

/// Ridler & Calvard iterative selection.
pub fn isodata(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let mut g = (1..n).find(|&i| data[i] > 0).map(|i| i + 1)?;

    loop {
        if g + 1 >= n {
            return None;
        }
        let (mut l, mut totl) = (0u64, 0u64);
        for (i, &v) in data.iter().enumerate().take(g + 1) {
            totl += v;
            l += v * i as u64;
        }
        let (mut h, mut toth) = (0u64, 0u64);
        for (i, &v) in data.iter().enumerate().skip(g + 1) {
            toth += v;
            h += v * i as u64;
        }
        if totl > 0 && toth > 0 {
            l /= totl;
            h /= toth;
            if g == ((l + h) as f64 / 2.0).round() as usize {
                return Some(g);
            }
        }
        g += 1;
        if g > n - 2 {
            return None;
        }
    }
}

/// Li's iterative minimum cross entropy.
pub fn li(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let tolerance = 0.5;
    let num_pixels = total(data);
    let mean = (1..n).map(|ih| ih as f64 * data[ih] as f64).sum::<f64>() / num_pixels;

    let mut new_thresh = mean;
    let mut threshold;
    let mut iter = 0;
    loop {
        let old_thresh = new_thresh;
        threshold = (old_thresh + 0.5) as i64;
        let t = threshold.clamp(0, n as i64 - 1) as usize;

        let (mut sum_back, mut num_back) = (0.0, 0.0);
        for (ih, &v) in data.iter().enumerate().take(t + 1) {
            sum_back += ih as f64 * v as f64;
            num_back += v as f64;
        }
        let mean_back = if num_back == 0.0 { 0.0 } else { sum_back / num_back };

        let (mut sum_obj, mut num_obj) = (0.0, 0.0);
        for (ih, &v) in data.iter().enumerate().skip(t + 1) {
            sum_obj += ih as f64 * v as f64;
            num_obj += v as f64;
        }
        let mean_obj = if num_obj == 0.0 { 0.0 } else { sum_obj / num_obj };

        let temp = (mean_back - mean_obj) / (mean_back.ln() - mean_obj.ln());
        if temp.is_nan() {
            return None;
        }
        new_thresh = if temp < -f64::EPSILON {
            (temp - 0.5).trunc()
        } else {
            (temp + 0.5).trunc()
        };

        if (new_thresh - old_thresh).abs() <= tolerance {
            break;
        }
        iter += 1;
        if iter > MAX_REFINEMENT_ITERATIONS {
            return None;
        }
    }

    checked_bin(threshold, n)
}

/// Kapur, Sahoo & Wong maximum entropy.
pub fn max_entropy(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let c = Cumulative::new(data);

    let mut threshold = None;
    let mut max_ent = 0.0;
    for it in c.first_bin..=c.last_bin {
        let mut ent_back = 0.0;
        for ih in 0..=it {
            if data[ih] != 0 {
                let p = c.norm[ih] / c.p1[it];
                ent_back -= p * p.ln();
            }
        }
        let mut ent_obj = 0.0;
        for ih in (it + 1)..n {
            if data[ih] != 0 {
                let p = c.norm[ih] / c.p2[it];
                ent_obj -= p * p.ln();
            }
        }
        let tot_ent = ent_back + ent_obj;
        if max_ent < tot_ent {
            max_ent = tot_ent;
            threshold = Some(it);
        }
    }

    threshold
}

/// Mean of the histogram.
pub fn mean(data: &[u64]) -> Option<usize> {
    let tot = total(data);
    let sum: f64 = data
        .iter()
        .enumerate()
        .map(|(i, &v)| i as f64 * v as f64)
        .sum();
    checked_bin((sum / tot).floor() as i64, data.len())
}

/// Kittler & Illingworth minimum error, iterated from the mean.
pub fn min_error(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let last = n - 1;
    let mut threshold = mean(data)? as i64;
    let mut t_prev = -2;
    let mut iter = 0;

    let a_all = partial_sum(data, last);
    let b_all = partial_moment(data, last);
    let c_all = partial_second_moment(data, last);

    while threshold != t_prev {
        let t = checked_bin(threshold, n)?;
        let a_t = partial_sum(data, t);
        let b_t = partial_moment(data, t);
        let c_t = partial_second_moment(data, t);

        let mu = b_t / a_t;
        let nu = (b_all - b_t) / (a_all - a_t);
        let p = a_t / a_all;
        let q = (a_all - a_t) / a_all;
        let sigma2 = c_t / a_t - mu * mu;
        let tau2 = (c_all - c_t) / (a_all - a_t) - nu * nu;

        let w0 = 1.0 / sigma2 - 1.0 / tau2;
        let w1 = mu / sigma2 - nu / tau2;
        let w2 = (mu * mu) / sigma2 - (nu * nu) / tau2
            + ((sigma2 * (q * q)) / (tau2 * (p * p))).log10();

        // the next threshold would be imaginary, keep the current one
        let sqterm = w1 * w1 - w0 * w2;
        if sqterm < 0.0 {
            break;
        }

        t_prev = threshold;
        let temp = (w1 + sqterm.sqrt()) / w0;
        if temp.is_nan() {
            threshold = t_prev;
        } else {
            threshold = temp.floor() as i64;
        }

        iter += 1;
        if iter > MAX_REFINEMENT_ITERATIONS {
            return None;
        }
    }

    checked_bin(threshold, n)
}

/// Smooth until bimodal, then take the valley between the peaks.
pub fn minimum(data: &[u64]) -> Option<usize> {
    let n = data.len();
    if n < 3 {
        return None;
    }
    let max = data.iter().rposition(|&v| v > 0)?;
    let mut histo: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    let mut smoothed = vec![0.0; n];

    let mut iter = 0;
    while !bimodal(&histo) {
        for i in 1..(n - 1) {
            smoothed[i] = (histo[i - 1] + histo[i] + histo[i + 1]) / 3.0;
        }
        smoothed[0] = (histo[0] + histo[1]) / 3.0;
        smoothed[n - 1] = (histo[n - 2] + histo[n - 1]) / 3.0;
        histo.copy_from_slice(&smoothed);

        iter += 1;
        if iter > MAX_SMOOTHING_ITERATIONS {
            return None;
        }
    }

    (1..max).find(|&i| histo[i - 1] > histo[i] && histo[i + 1] >= histo[i])
}

/// Tsai's moment preserving threshold.
pub fn moments(data: &[u64]) -> Option<usize> {
    let histo = normalized(data);
    let m0 = 1.0;
    let (mut m1, mut m2, mut m3) = (0.0, 0.0, 0.0);
    for (i, &h) in histo.iter().enumerate() {
        let di = i as f64;
        m1 += di * h;
        m2 += di * di * h;
        m3 += di * di * di * h;
    }

    let cd = m0 * m2 - m1 * m1;
    let c0 = (-m2 * m2 + m1 * m3) / cd;
    let c1 = (m0 * -m3 + m2 * m1) / cd;
    let disc = (c1 * c1 - 4.0 * c0).sqrt();
    let z0 = 0.5 * (-c1 - disc);
    let z1 = 0.5 * (-c1 + disc);
    let p0 = (z1 - m1) / (z1 - z0);

    let mut sum = 0.0;
    for (i, &h) in histo.iter().enumerate() {
        sum += h;
        if sum > p0 {
            return Some(i);
        }
    }
    None
}

/// Otsu's method, maximizing between class variance.
pub fn otsu(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let histo = normalized(data);

    let mut cnh = vec![0.0; n];
    let mut mean = vec![0.0; n];
    cnh[0] = histo[0];
    for ih in 1..n {
        cnh[ih] = cnh[ih - 1] + histo[ih];
        mean[ih] = mean[ih - 1] + ih as f64 * histo[ih];
    }
    let total_mean = mean[n - 1];

    let mut threshold = None;
    let mut max_bcv = 0.0;
    for ih in 0..n {
        let diff = total_mean * cnh[ih] - mean[ih];
        let bcv = diff * diff / (cnh[ih] * (1.0 - cnh[ih]));
        if max_bcv < bcv {
            max_bcv = bcv;
            threshold = Some(ih);
        }
    }

    threshold
}

/// Split so that half of the voxels are foreground.
pub fn percentile(data: &[u64]) -> Option<usize> {
    let ptile = 0.5;
    let tot = total(data);
    let mut threshold = None;
    let mut best = 1.0;
    let mut cumulative = 0.0;
    for (i, &v) in data.iter().enumerate() {
        cumulative += v as f64;
        let dist = (cumulative / tot - ptile).abs();
        if dist < best {
            best = dist;
            threshold = Some(i);
        }
    }
    threshold
}

/// Kapur, Sahoo & Wong with Renyi entropies of order 0.5, 1 and 2 combined.
pub fn renyi_entropy(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let c = Cumulative::new(data);

    // order 1 is the maximum entropy threshold
    let mut t_star2 = max_entropy(data).unwrap_or(0);

    let mut t_star1 = 0;
    let mut max_ent = 0.0;
    for it in c.first_bin..=c.last_bin {
        let ent_back: f64 = (0..=it).map(|ih| (c.norm[ih] / c.p1[it]).sqrt()).sum();
        let ent_obj: f64 = ((it + 1)..n).map(|ih| (c.norm[ih] / c.p2[it]).sqrt()).sum();
        let product = ent_back * ent_obj;
        let tot_ent = if product > 0.0 { product.ln() } else { 0.0 };
        if tot_ent > max_ent {
            max_ent = tot_ent;
            t_star1 = it;
        }
    }

    let mut t_star3 = 0;
    let mut max_ent = 0.0;
    for it in c.first_bin..=c.last_bin {
        let ent_back: f64 = (0..=it)
            .map(|ih| (c.norm[ih] * c.norm[ih]) / (c.p1[it] * c.p1[it]))
            .sum();
        let ent_obj: f64 = ((it + 1)..n)
            .map(|ih| (c.norm[ih] * c.norm[ih]) / (c.p2[it] * c.p2[it]))
            .sum();
        let product = ent_back * ent_obj;
        let tot_ent = -(if product > 0.0 { product.ln() } else { 0.0 });
        if tot_ent > max_ent {
            max_ent = tot_ent;
            t_star3 = it;
        }
    }

    if t_star2 < t_star1 {
        std::mem::swap(&mut t_star1, &mut t_star2);
    }
    if t_star3 < t_star2 {
        std::mem::swap(&mut t_star2, &mut t_star3);
    }
    if t_star2 < t_star1 {
        std::mem::swap(&mut t_star1, &mut t_star2);
    }

    let close = |a: usize, b: usize| a.abs_diff(b) <= 5;
    let (beta1, beta2, beta3) = match (close(t_star1, t_star2), close(t_star2, t_star3)) {
        (true, true) => (1.0, 2.0, 1.0),
        (true, false) => (0.0, 1.0, 3.0),
        (false, true) => (3.0, 1.0, 0.0),
        (false, false) => (1.0, 2.0, 1.0),
    };

    let omega = c.p1[t_star3] - c.p1[t_star1];
    let opt = t_star1 as f64 * (c.p1[t_star1] + 0.25 * omega * beta1)
        + 0.25 * t_star2 as f64 * omega * beta2
        + t_star3 as f64 * (c.p2[t_star3] + 0.25 * omega * beta3);

    checked_bin(opt as i64, n)
}

/// Shanbhag's fuzzy entropy.
pub fn shanbhag(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let c = Cumulative::new(data);

    let mut threshold = None;
    let mut min_ent = f64::MAX;
    for it in c.first_bin..=c.last_bin {
        let term = 0.5 / c.p1[it];
        let mut ent_back = 0.0;
        for ih in 1..=it {
            ent_back -= c.norm[ih] * (1.0 - term * c.p1[ih - 1]).ln();
        }
        ent_back *= term;

        let term = 0.5 / c.p2[it];
        let mut ent_obj = 0.0;
        for ih in (it + 1)..n {
            ent_obj -= c.norm[ih] * (1.0 - term * c.p2[ih]).ln();
        }
        ent_obj *= term;

        let tot_ent = (ent_back - ent_obj).abs();
        if tot_ent < min_ent {
            min_ent = tot_ent;
            threshold = Some(it);
        }
    }

    threshold
}

/// Zack's triangle method, on the longer tail of the histogram.
pub fn triangle(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let mut data = data.to_vec();

    let mut min = data.iter().position(|&v| v > 0)?;
    // the line starts at the empty bin before the first occupied one
    min = min.saturating_sub(1);
    let mut min2 = (1..n).rev().find(|&i| data[i] > 0).unwrap_or(0);
    if min2 < n - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0;
    for (i, &v) in data.iter().enumerate() {
        if v > dmax {
            max = i;
            dmax = v;
        }
    }

    let inverted = (max as i64 - min as i64) < (min2 as i64 - max as i64);
    if inverted {
        data.reverse();
        min = n - 1 - min2;
        max = n - 1 - max;
    }

    if min == max {
        return Some(min);
    }

    let mut nx = data[max] as f64;
    let mut ny = min as f64 - max as f64;
    let d = (nx * nx + ny * ny).sqrt();
    nx /= d;
    ny /= d;
    let d = nx * min as f64 + ny * data[min] as f64;

    let mut split = min;
    let mut split_distance = 0.0;
    for i in (min + 1)..=max {
        let distance = nx * i as f64 + ny * data[i] as f64 - d;
        if distance > split_distance {
            split = i;
            split_distance = distance;
        }
    }
    let split = split.saturating_sub(1);

    if inverted {
        Some(n - 1 - split)
    } else {
        Some(split)
    }
}

/// Yen's maximum correlation criterion.
pub fn yen(data: &[u64]) -> Option<usize> {
    let n = data.len();
    let norm = normalized(data);

    let mut p1 = vec![0.0; n];
    let mut p1_sq = vec![0.0; n];
    let mut p2_sq = vec![0.0; n];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for ih in 1..n {
        p1[ih] = p1[ih - 1] + norm[ih];
        p1_sq[ih] = p1_sq[ih - 1] + norm[ih] * norm[ih];
    }
    for ih in (0..(n - 1)).rev() {
        p2_sq[ih] = p2_sq[ih + 1] + norm[ih + 1] * norm[ih + 1];
    }

    let safe_ln = |v: f64| if v > 0.0 { v.ln() } else { 0.0 };

    let mut threshold = None;
    let mut max_crit = f64::MIN_POSITIVE;
    for it in 0..n {
        let crit = -safe_ln(p1_sq[it] * p2_sq[it]) + 2.0 * safe_ln(p1[it] * (1.0 - p1[it]));
        if crit > max_crit {
            max_crit = crit;
            threshold = Some(it);
        }
    }

    threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two blobs of equal mass centred on `a` and `b`, the upper one wider.
    fn bimodal_histogram(n: usize, a: usize, b: usize) -> Vec<u64> {
        (0..n)
            .map(|i| {
                let da = i as f64 - a as f64;
                let db = i as f64 - b as f64;
                let v = 1000.0 * (-da * da / 50.0).exp() + 645.0 * (-db * db / 120.0).exp();
                v.round() as u64
            })
            .collect()
    }

    // Piecewise linear "W": peaks at 50 and 150, valley at 100.
    fn w_histogram() -> Vec<u64> {
        (0..=200i64)
            .map(|i| (101 - ((i - 100).abs() - 50).abs()) as u64)
            .collect()
    }

    type Method = fn(&[u64]) -> Option<usize>;

    const METHODS: [(&str, Method); 16] = [
        ("Default", default_isodata),
        ("Huang", huang),
        ("Intermodes", intermodes),
        ("IsoData", isodata),
        ("Li", li),
        ("MaxEntropy", max_entropy),
        ("Mean", mean),
        ("MinError", min_error),
        ("Minimum", minimum),
        ("Moments", moments),
        ("Otsu", otsu),
        ("Percentile", percentile),
        ("RenyiEntropy", renyi_entropy),
        ("Shanbhag", shanbhag),
        ("Triangle", triangle),
        ("Yen", yen),
    ];

    #[test]
    fn test_symmetric_bimodal_splits_between_modes() {
        let data = bimodal_histogram(256, 60, 190);
        for (name, method) in METHODS {
            let t = method(&data).unwrap_or_else(|| panic!("{} found no threshold", name));
            assert!(t > 60 && t < 190, "{} gave {}", name, t);
        }
    }

    #[test]
    fn test_mean() {
        let mut data = vec![0u64; 256];
        data[0] = 50;
        data[200] = 50;
        assert_eq!(mean(&data), Some(100));
    }

    #[test]
    fn test_otsu_two_levels() {
        let mut data = vec![0u64; 191];
        data[0] = 30;
        data[190] = 70;
        let t = otsu(&data).unwrap();
        assert!(t < 190);
    }

    #[test]
    fn test_percentile_halves_population() {
        let data = vec![10u64; 100];
        assert_eq!(percentile(&data), Some(49));
    }

    #[test]
    fn test_intermodes_and_minimum_on_clean_modes() {
        let data = w_histogram();
        assert_eq!(intermodes(&data), Some(100));
        assert_eq!(minimum(&data), Some(100));
    }

    #[test]
    fn test_intermodes_smooths_jitter() {
        let data: Vec<u64> = w_histogram()
            .iter()
            .enumerate()
            .map(|(i, &v)| v + 3 * (i % 2) as u64)
            .collect();
        assert!(!bimodal(&data.iter().map(|&v| v as f64).collect::<Vec<_>>()));

        let t = intermodes(&data).unwrap();
        assert!((95..=105).contains(&t), "intermodes gave {}", t);
    }

    #[test]
    fn test_intermodes_needs_three_bins() {
        assert_eq!(intermodes(&[8, 8]), None);
        assert_eq!(intermodes(&[8]), None);
    }

    #[test]
    fn test_triangle_long_tail() {
        // peak at the bottom with a convex tail to the right
        let data: Vec<u64> = (0..256u64).map(|i| (255 - i) * (255 - i) / 25 + 1).collect();
        let t = triangle(&data).unwrap();
        assert!(t > 64 && t < 192, "triangle gave {}", t);
    }
}
