use reed_solomon_erasure::galois_8::ReedSolomon;

use super::error::{Result, RetryError};

/// Splits `data` into `data_shards` equal-size shards (padding the last with
/// zeros) and appends `parity_shards` Reed-Solomon parity shards.
pub fn encode(data: &[u8], data_shards: usize, parity_shards: usize) -> Result<Vec<Vec<u8>>> {
    let shard_len = data.len().div_ceil(data_shards).max(1);
    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(data_shards + parity_shards);

    for i in 0..data_shards {
        let start = i * shard_len;
        let mut shard = vec![0u8; shard_len];
        if start < data.len() {
            let end = (start + shard_len).min(data.len());
            shard[..end - start].copy_from_slice(&data[start..end]);
        }
        shards.push(shard);
    }
    for _ in 0..parity_shards {
        shards.push(vec![0u8; shard_len]);
    }

    let rs = ReedSolomon::new(data_shards, parity_shards)?;
    rs.encode(&mut shards)?;
    Ok(shards)
}

/// Attempts to reconstruct missing shards in place. `shards[i]` is `None`
/// where a shard was lost; on success every entry is `Some`.
pub fn reconstruct(
    shards: &mut [Option<Vec<u8>>],
    data_shards: usize,
    parity_shards: usize,
) -> Result<()> {
    let rs = ReedSolomon::new(data_shards, parity_shards)?;
    rs.reconstruct(shards)
        .map_err(RetryError::Erasure)
}

/// Number of parity shards to request for a logical block given the
/// configured redundancy fraction, per the monotonic step table used
/// throughout this crate for SNR/loss-rate-driven decisions.
pub fn parity_count(data_shards: usize, redundancy: f32) -> usize {
    ((data_shards as f32) * redundancy.clamp(0.0, 1.0)).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_reconstruct_roundtrip() {
        let data = b"a narrowband content transfer payload that spans shards";
        let shards = encode(data, 4, 2).unwrap();

        let mut lossy: Vec<Option<Vec<u8>>> = shards.iter().cloned().map(Some).collect();
        lossy[1] = None;
        lossy[3] = None;

        reconstruct(&mut lossy, 4, 2).unwrap();

        let recovered: Vec<Vec<u8>> = lossy.into_iter().map(|s| s.unwrap()).collect();
        assert_eq!(recovered, shards);
    }

    #[test]
    fn parity_count_scales_with_redundancy() {
        assert_eq!(parity_count(8, 0.25), 2);
        assert_eq!(parity_count(8, 0.0), 0);
        assert_eq!(parity_count(8, 1.0), 8);
    }
}
