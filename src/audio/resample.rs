//! Fixed-length linear resampling of OS-delivered buffers

/// Stretch or squeeze `source` to exactly `target.len()` samples.
///
/// Output sample `i` is taken at fractional source position
/// `i * (source.len() - 1) / (target.len() - 1)` and linearly interpolated
/// between its two neighbours, so the first and last samples are copied
/// exactly. Does not allocate.
pub fn stretch_into(source: &[f32], target: &mut [f32]) {
    match (source.len(), target.len()) {
        (_, 0) => {}
        (0, _) => target.fill(0.0),
        (1, _) => target.fill(source[0]),
        (_, 1) => target[0] = source[0],
        (src_len, dst_len) if src_len == dst_len => target.copy_from_slice(source),
        (src_len, dst_len) => {
            let step = (src_len - 1) as f64 / (dst_len - 1) as f64;
            for (i, out) in target.iter_mut().enumerate() {
                let pos = i as f64 * step;
                let index = (pos.floor() as usize).min(src_len - 1);
                let frac = (pos - index as f64) as f32;
                *out = if index + 1 < src_len {
                    source[index] + (source[index + 1] - source[index]) * frac
                } else {
                    source[index]
                };
            }
            target[dst_len - 1] = source[src_len - 1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_and_last_samples() {
        let source: Vec<f32> = (0..1014).map(|i| ((i * 37) % 101) as f32 - 50.0).collect();
        let mut target = vec![0.0; 1024];

        stretch_into(&source, &mut target);

        assert_eq!(target[0], source[0]);
        assert_eq!(target[1023], source[1013]);
    }

    #[test]
    fn equal_neighbours_produce_flat_output() {
        let mut source = vec![0.0f32; 1014];
        source[..500].fill(-200.0);
        source[500..].fill(300.0);
        let mut target = vec![0.0; 1024];

        stretch_into(&source, &mut target);

        let step = 1013.0 / 1023.0;
        for (i, &value) in target.iter().enumerate() {
            let pos = i as f64 * step;
            if pos <= 499.0 {
                assert_eq!(value, -200.0, "index {i}");
            } else if pos >= 500.0 {
                assert_eq!(value, 300.0, "index {i}");
            } else {
                assert!((-200.0..=300.0).contains(&value), "index {i}");
            }
        }
    }

    #[test]
    fn ramp_stays_monotonic() {
        let source: Vec<f32> = (0..1014).map(|i| i as f32).collect();
        let mut target = vec![0.0; 1024];

        stretch_into(&source, &mut target);

        assert!(target.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(target[0], 0.0);
        assert_eq!(target[1023], 1013.0);
    }

    #[test]
    fn downsampling_also_keeps_endpoints() {
        let source: Vec<f32> = (0..1100).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut target = vec![0.0; 1024];

        stretch_into(&source, &mut target);

        assert_eq!(target[0], source[0]);
        assert_eq!(target[1023], source[1099]);
    }

    #[test]
    fn degenerate_lengths() {
        let mut target = vec![9.0; 4];
        stretch_into(&[], &mut target);
        assert_eq!(target, vec![0.0; 4]);

        stretch_into(&[5.0], &mut target);
        assert_eq!(target, vec![5.0; 4]);

        let mut single = [0.0];
        stretch_into(&[1.0, 2.0, 3.0], &mut single);
        assert_eq!(single, [1.0]);

        let mut same = [0.0; 3];
        stretch_into(&[1.0, 2.0, 3.0], &mut same);
        assert_eq!(same, [1.0, 2.0, 3.0]);
    }
}
