use candle::{Device, Result, Tensor};

/// Builds a `(batch, 1, max_len)` u8 mask that is 1 on padded frames.
///
/// `max_len` defaults to the longest entry of `lengths`.
pub fn make_pad_mask(lengths: &[usize], max_len: Option<usize>, device: &Device) -> Result<Tensor> {
    build(lengths, max_len, device, |t, len| t >= len)
}

/// Builds a `(batch, 1, max_len)` u8 mask that is 1 on valid frames.
///
/// This is the keep-mask the attention layers expect for the encoder memory.
pub fn make_non_pad_mask(
    lengths: &[usize],
    max_len: Option<usize>,
    device: &Device,
) -> Result<Tensor> {
    build(lengths, max_len, device, |t, len| t < len)
}

fn build(
    lengths: &[usize],
    max_len: Option<usize>,
    device: &Device,
    set: impl Fn(usize, usize) -> bool,
) -> Result<Tensor> {
    let longest = lengths.iter().copied().max().unwrap_or(0);
    let max_len = match max_len {
        Some(max_len) if max_len < longest => {
            candle::bail!("max_len {max_len} is shorter than the longest sequence {longest}")
        }
        Some(max_len) => max_len,
        None => longest,
    };

    let mask: Vec<u8> = lengths
        .iter()
        .flat_map(|&len| (0..max_len).map(move |t| (t, len)))
        .map(|(t, len)| set(t, len) as u8)
        .collect();

    Tensor::from_vec(mask, (lengths.len(), 1, max_len), device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_mask() {
        let mask = make_pad_mask(&[3, 1, 2], None, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[3, 1, 3]);
        assert_eq!(
            mask.squeeze(1).unwrap().to_vec2::<u8>().unwrap(),
            vec![vec![0, 0, 0], vec![0, 1, 1], vec![0, 0, 1]]
        );
    }

    #[test]
    fn test_non_pad_mask_with_max_len() {
        let mask = make_non_pad_mask(&[2, 4], Some(5), &Device::Cpu).unwrap();
        assert_eq!(
            mask.squeeze(1).unwrap().to_vec2::<u8>().unwrap(),
            vec![vec![1, 1, 0, 0, 0], vec![1, 1, 1, 1, 0]]
        );
    }

    #[test]
    fn test_max_len_too_short() {
        assert!(make_pad_mask(&[6], Some(4), &Device::Cpu).is_err());
    }
}
