/// Generate a random `f64` in the range `[low, high)`.
#[inline]
pub(crate) fn f64_range(rng: &mut fastrand::Rng, low: f64, high: f64) -> f64 {
    let u = rng.f64();
    let span = high - low;
    if span.is_finite() {
        low + u * span
    } else {
        // Wider than f64::MAX: interpolate without forming the span.
        low * (1.0 - u) + high * u
    }
}

/// Derive the seed of an independent stream for one `(trial, parameter)`
/// pair from a base seed.
///
/// The name is folded in with FNV-1a and the result is finalized with the
/// `SplitMix64` mixer, so neighbouring trial numbers land on unrelated
/// streams.
pub(crate) fn stream_seed(base: u64, trial_number: u64, name: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    splitmix64(base ^ splitmix64(trial_number ^ h))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
