use super::SecondOrderSection;

/// Forward-backward filtering through a cascade of sections.
///
/// The window is extended at both ends by `pad_len` samples of odd
/// reflection, each pass starts from the steady state of its first input
/// sample, and the padding is trimmed afterwards. Returns `None` when the
/// window is not longer than `pad_len`.
pub fn filtfilt(sections: &[SecondOrderSection], window: &[f64], pad_len: usize) -> Option<Vec<f64>> {
    if window.len() <= pad_len {
        return None;
    }

    let extended = odd_extension(window, pad_len);

    let mut forward = filter_from_rest(sections, &extended);
    forward.reverse();
    let mut backward = filter_from_rest(sections, &forward);
    backward.reverse();

    Some(backward[pad_len..pad_len + window.len()].to_vec())
}

// Point-symmetric reflection about the first and last samples
fn odd_extension(window: &[f64], pad_len: usize) -> Vec<f64> {
    let n = window.len();
    let first = window[0];
    let last = window[n - 1];

    let mut extended = Vec::with_capacity(n + 2 * pad_len);
    extended.extend((1..=pad_len).rev().map(|i| 2.0 * first - window[i]));
    extended.extend_from_slice(window);
    extended.extend((1..=pad_len).map(|i| 2.0 * last - window[n - 1 - i]));
    extended
}

// Runs the cascade with every section initialised as if the first input
// value had been applied forever.
fn filter_from_rest(sections: &[SecondOrderSection], signal: &[f64]) -> Vec<f64> {
    let x0 = signal.first().copied().unwrap_or(0.0);

    let mut level = x0;
    let mut states: Vec<[f64; 2]> = sections
        .iter()
        .map(|section| {
            let [z0, z1] = section.steady_state();
            let state = [z0 * level, z1 * level];
            level *= section.dc_gain();
            state
        })
        .collect();

    signal
        .iter()
        .map(|&sample| {
            sections
                .iter()
                .zip(states.iter_mut())
                .fold(sample, |input, (section, z)| section.step(z, input))
        })
        .collect()
}
