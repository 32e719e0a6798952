//! ## Large container
//! Approximate counter used once the medium container overflows.
//! This representation uses modified HyperLogLog++ with `M = 2^P` registers of `W` width.
//!
//! [Original HyperLogLog++ paper](https://static.googleusercontent.com/media/research.google.com/en//pubs/archive/40671.pdf)
//!
//! Slice encoding:
//! - data[0]       - stores number of HyperLogLog registers set to 0.
//! - data[1]       - stores harmonic sum of HyperLogLog registers (`f32` transmuted into `u32`).
//! - data[2..]     - stores register ranks using `W` bits per each register.
//! - data[last]    - always zero, allows branchless register access.
//!
//! Serialized form is `data[0..last]` as little-endian `u32` words. The number of zero registers
//! is recounted on read. The harmonic sum is recomputed from the registers and the serialized one
//! is kept only when it is within `SUM_TOLERANCE` of it, so a round trip keeps the estimate intact.

use std::hash::{BuildHasher, BuildHasherDefault, Hash, Hasher};
use std::io::{self, Read, Write};
use std::mem::{size_of, size_of_val};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{EstimatorError, Result};
use crate::representation::RepresentationTrait;

/// Maximum relative difference between serialized and recomputed harmonic sums
const SUM_TOLERANCE: f64 = 1e-3;

/// Large representation container
pub(crate) struct HyperLogLog<H, const P: usize = 12, const W: usize = 6> {
    data: Box<[u32]>,
    /// Zero-sized build hasher
    build_hasher: BuildHasherDefault<H>,
}

impl<H: Hasher + Default, const P: usize, const W: usize> HyperLogLog<H, P, W> {
    /// Ensure that `P` and `W` are in correct range at compile time
    const VALID_PARAMS: () = assert!(P >= 4 && P <= 18 && W >= 4 && W <= 6);
    /// Number of HyperLogLog registers
    const M: usize = 1 << P;
    /// Largest rank which fits into `W` bits
    const MAX_RANK: u32 = (1 << W) - 1;
    /// Number of `u32` words holding packed registers
    const REGISTER_WORDS: usize = (Self::M * W).div_ceil(32);
    /// Number of `u32` words in serialized form
    const WIRE_WORDS: usize = Self::REGISTER_WORDS + 2;
    /// HyperLogLog representation `u32` slice length based on #registers, stored zero registers, harmonic sum, and
    /// one extra element for branchless register updates (see `set_register` for more details).
    pub(crate) const HLL_SLICE_LEN: usize = Self::REGISTER_WORDS + 3;

    /// Create new empty instance of `HyperLogLog`
    pub(crate) fn new() -> Self {
        _ = Self::VALID_PARAMS;

        let mut data = vec![0u32; Self::HLL_SLICE_LEN].into_boxed_slice();
        data[0] = Self::M as u32;
        data[1] = (Self::M as f32).to_bits();
        Self {
            data,
            build_hasher: BuildHasherDefault::default(),
        }
    }

    /// Insert hashable item into `HyperLogLog`
    #[inline]
    pub(crate) fn insert<T: Hash + ?Sized>(&mut self, item: &T) {
        let mut hasher = self.build_hasher.build_hasher();
        item.hash(&mut hasher);
        self.insert_hash(hasher.finish());
    }

    /// Insert hash: lowest `P` bits select register, the rest define its rank
    #[inline]
    pub(crate) fn insert_hash(&mut self, hash: u64) {
        let idx = (hash & (Self::M as u64 - 1)) as u32;
        let rank = ((hash >> P).trailing_zeros() + 1).min(Self::MAX_RANK);
        let old_rank = self.get_register(idx);
        if rank > old_rank {
            self.set_register(idx, old_rank, rank);
        }
    }

    /// Return cardinality estimate
    #[inline]
    pub(crate) fn estimate(&self) -> usize {
        let zeros = self.data[0];
        let sum = f64::from(f32::from_bits(self.data[1]));
        let estimate = alpha(Self::M) * ((Self::M * (Self::M - zeros as usize)) as f64)
            / (sum + beta_horner(f64::from(zeros), P));
        (estimate + 0.5) as usize
    }

    /// Get HyperLogLog `idx` register
    #[inline]
    fn get_register(&self, idx: u32) -> u32 {
        get_register::<W>(&self.data, idx)
    }

    /// Set HyperLogLog `idx` register to new value `rank`
    #[inline]
    fn set_register(&mut self, idx: u32, old_rank: u32, new_rank: u32) {
        let bit_idx = (idx as usize) * W;
        let u32_idx = (bit_idx / 32) + 2;
        let bit_pos = bit_idx % 32;
        // SAFETY: `self.data` is always guaranteed to have these elements.
        let bits = unsafe { self.data.get_unchecked_mut(u32_idx..u32_idx + 2) };
        let bits_1 = W.min(32 - bit_pos);
        let bits_2 = W - bits_1;
        let mask_1 = (1 << bits_1) - 1;
        let mask_2 = (1 << bits_2) - 1;

        // Unconditionally update two `u32` elements based on `new_rank` bits and masks
        bits[0] &= !(mask_1 << bit_pos);
        bits[0] |= (new_rank & mask_1) << bit_pos;
        bits[1] &= !mask_2;
        bits[1] |= (new_rank >> bits_1) & mask_2;

        // Update HyperLogLog's number of zero registers and harmonic sum
        let zeros_and_sum = &mut self.data[0..2];
        zeros_and_sum[0] -= u32::from(old_rank == 0) & u32::from(zeros_and_sum[0] > 0);

        let mut sum = f32::from_bits(zeros_and_sum[1]);
        sum -= 1.0 / ((1u64 << u64::from(old_rank)) as f32);
        sum += 1.0 / ((1u64 << u64::from(new_rank)) as f32);
        zeros_and_sum[1] = sum.to_bits();
    }

    /// Merge two `HyperLogLog` representations by taking register-wise maximum.
    pub(crate) fn merge(&mut self, rhs: &Self) {
        self.merge_registers(&rhs.data);
    }

    /// Merge registers packed into `rhs` slice of `HLL_SLICE_LEN` length
    fn merge_registers(&mut self, rhs: &[u32]) {
        for idx in 0..Self::M as u32 {
            let lhs_rank = self.get_register(idx);
            let rhs_rank = get_register::<W>(rhs, idx);
            if rhs_rank > lhs_rank {
                self.set_register(idx, lhs_rank, rhs_rank);
            }
        }
    }

    /// Replace content with serialized `HyperLogLog` read from `input`
    pub(crate) fn read<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        input.read_u32_into::<LittleEndian>(&mut self.data[..Self::WIRE_WORDS])?;
        self.data[Self::HLL_SLICE_LEN - 1] = 0;

        let zeros = (0..Self::M as u32)
            .filter(|&idx| self.get_register(idx) == 0)
            .count();
        self.data[0] = zeros as u32;

        let sum = f64::from(f32::from_bits(self.data[1]));
        let expected = self.harmonic_sum();
        let consistent = (sum - expected).abs() <= expected * SUM_TOLERANCE;
        if !consistent {
            self.data[1] = (expected as f32).to_bits();
            return Err(EstimatorError::Malformed(
                "harmonic sum does not match registers",
            ));
        }
        Ok(())
    }

    /// Compute harmonic sum of all registers
    fn harmonic_sum(&self) -> f64 {
        (0..Self::M as u32)
            .map(|idx| 1.0 / (1u64 << self.get_register(idx)) as f64)
            .sum()
    }

    /// Merge serialized `HyperLogLog` read from `input` into `self`
    pub(crate) fn read_and_merge<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        let mut rhs = vec![0u32; Self::HLL_SLICE_LEN];
        input.read_u32_into::<LittleEndian>(&mut rhs[..Self::WIRE_WORDS])?;
        self.merge_registers(&rhs);
        Ok(())
    }
}

impl<H: Hasher + Default, const P: usize, const W: usize> RepresentationTrait
    for HyperLogLog<H, P, W>
{
    /// Return cardinality estimate of `HyperLogLog` representation
    #[inline]
    fn size(&self) -> usize {
        self.estimate()
    }

    /// Return memory size of `HyperLogLog`
    fn size_of(&self) -> usize {
        size_of::<Self>() + size_of_val(&*self.data)
    }

    fn write(&self, out: &mut dyn Write) -> io::Result<()> {
        for &word in &self.data[..Self::WIRE_WORDS] {
            out.write_u32::<LittleEndian>(word)?;
        }
        Ok(())
    }
}

impl<H: Hasher + Default, const P: usize, const W: usize> Clone for HyperLogLog<H, P, W> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            build_hasher: BuildHasherDefault::default(),
        }
    }
}

impl<H: Hasher + Default, const P: usize, const W: usize> PartialEq for HyperLogLog<H, P, W> {
    fn eq(&self, rhs: &Self) -> bool {
        self.data == rhs.data
    }
}

/// Get `idx` register from slice of HyperLogLog encoding
#[inline]
fn get_register<const W: usize>(data: &[u32], idx: u32) -> u32 {
    let bit_idx = (idx as usize) * W;
    let u32_idx = (bit_idx / 32) + 2;
    let bit_pos = bit_idx % 32;
    let bits = &data[u32_idx..u32_idx + 2];
    let bits_1 = W.min(32 - bit_pos);
    let bits_2 = W - bits_1;
    let mask_1 = (1 << bits_1) - 1;
    let mask_2 = (1 << bits_2) - 1;

    ((bits[0] >> bit_pos) & mask_1) | ((bits[1] & mask_2) << bits_1)
}

/// Parameter for bias correction
#[inline]
fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / (m as f64)),
    }
}
/// Computes LogLog-Beta estimate bias correction using Horner's method.
///
/// Paper: https://arxiv.org/pdf/1612.02284.pdf
/// Wikipedia: https://en.wikipedia.org/wiki/Horner%27s_method
#[inline]
fn beta_horner(z: f64, precision: usize) -> f64 {
    let beta = BETA[precision - 4];
    let zl = (z + 1.0).ln();
    let mut res = 0.0;
    for i in (1..8).rev() {
        res = res * zl + beta[i];
    }
    res * zl + beta[0] * z
}

/// LogLog-Beta polynomial coefficients for precision in [4..18] range.
const BETA: [[f64; 8]; 15] = [
    // p = 4
    [
        -0.582581413904517,
        -1.93530035756005,
        11.079323758035073,
        -22.131357446444323,
        22.505391846630037,
        -12.000723834917984,
        3.220579408194167,
        -0.342225302271235,
    ],
    // p = 5
    [
        -0.7518999460733967,
        -0.959003007774876,
        5.59973713221416,
        -8.209763699976552,
        6.509125489447204,
        -2.683029373432373,
        0.5612891113138221,
        -0.0463331622196545,
    ],
    // p = 6
    [
        29.825790096961963,
        -31.328708333772592,
        -10.594252303658228,
        -11.572012568909962,
        3.818875437390749,
        -2.416013032853081,
        0.4542208940970826,
        -0.0575155452020420,
    ],
    // p = 7
    [
        2.810292129082006,
        -3.9780498518175995,
        1.3162680041351582,
        -3.92524863358059,
        2.008083575394647,
        -0.7527151937556955,
        0.1265569894242751,
        -0.0109946438726240,
    ],
    // p = 8
    [
        1.0063354488755052,
        -2.005806664051124,
        1.6436974936651412,
        -2.7056080994056617,
        1.392099802442226,
        -0.4647037427218319,
        0.07384282377269775,
        -0.00578554885254223,
    ],
    // p = 9
    [
        -0.09415657458167959,
        -0.7813097592455053,
        1.7151494675071246,
        -1.7371125040651634,
        0.8644150848904892,
        -0.23819027465047218,
        0.03343448400269076,
        -0.00207858528178157,
    ],
    // p = 10
    [
        -0.25935400670790054,
        -0.5259830199980581,
        1.4893303492587684,
        -1.2964271408499357,
        0.6228475621722162,
        -0.1567232677025104,
        0.02054415903878563,
        -0.00112488483925502,
    ],
    // p = 11
    [
        -4.32325553856025e-01,
        -1.08450736399632e-01,
        6.09156550741120e-01,
        -1.65687801845180e-02,
        -7.95829341087617e-02,
        4.71830602102918e-02,
        -7.81372902346934e-03,
        5.84268708489995e-04,
    ],
    // p = 12
    [
        -3.84979202588598e-01,
        1.83162233114364e-01,
        1.30396688841854e-01,
        7.04838927629266e-02,
        -8.95893971464453e-03,
        1.13010036741605e-02,
        -1.94285569591290e-03,
        2.25435774024964e-04,
    ],
    // p = 13
    [
        -0.41655270946462997,
        -0.22146677040685156,
        0.38862131236999947,
        0.4534097974606237,
        -0.36264738324476375,
        0.12304650053558529,
        -0.0170154038455551,
        0.00102750367080838,
    ],
    // p = 14
    [
        -3.71009760230692e-01,
        9.78811941207509e-03,
        1.85796293324165e-01,
        2.03015527328432e-01,
        -1.16710521803686e-01,
        4.31106699492820e-02,
        -5.99583540511831e-03,
        4.49704299509437e-04,
    ],
    // p = 15
    [
        -0.38215145543875273,
        -0.8906940053609084,
        0.3760233577467887,
        0.9933597744068238,
        -0.6557744163831896,
        0.1833234212970361,
        -0.02241529633062872,
        0.00121399789330194,
    ],
    // p = 16
    [
        -0.3733187664375306,
        -1.41704077448123,
        0.40729184796612533,
        1.5615203390658416,
        -0.9924223353428613,
        0.2606468139948309,
        -0.03053811369682807,
        0.00155770210179105,
    ],
    // p = 17
    [
        -0.36775502299404605,
        0.5383142235137797,
        0.7697028927876792,
        0.5500258358645056,
        -0.7457558826114694,
        0.2571183578582195,
        -0.03437902606864149,
        0.00185949146371616,
    ],
    // p = 18
    [
        -0.3647962332596054,
        0.9973041232863503,
        1.5535438623008122,
        1.2593267719802892,
        -1.5332594820911016,
        0.4780104220005659,
        -0.05951025172951174,
        0.00291076804642205,
    ],
];

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use wyhash::WyHash;

    type Hll = HyperLogLog<WyHash, 12, 6>;

    fn hll_with(keys: std::ops::Range<u64>) -> Hll {
        let mut hll = Hll::new();
        keys.for_each(|k| hll.insert(&k));
        hll
    }

    #[test]
    fn test_empty() {
        assert_eq!(Hll::new().estimate(), 0);
    }

    #[test_case(100)]
    #[test_case(1_000)]
    #[test_case(10_000)]
    #[test_case(100_000)]
    fn test_estimate(n: u64) {
        let estimate = hll_with(0..n).estimate() as f64;
        let relative_error = (estimate - n as f64).abs() / n as f64;
        assert!(relative_error < 0.1, "estimate {estimate} for {n}");
    }

    #[test]
    fn test_duplicates() {
        let mut hll = hll_with(0..5_000);
        let estimate = hll.estimate();
        (0..5_000u64).for_each(|k| hll.insert(&k));
        assert_eq!(hll.estimate(), estimate);
    }

    #[test_case(4, 0 => 15; "w4")]
    #[test_case(6, 0 => 63; "w6")]
    #[test_case(6, 0b1_0000_0000_0000 => 1; "lowest rank bit set")]
    fn test_rank_capping(width: usize, hash: u64) -> u32 {
        match width {
            4 => {
                let mut hll = HyperLogLog::<WyHash, 12, 4>::new();
                hll.insert_hash(hash);
                hll.get_register(0)
            }
            _ => {
                let mut hll = HyperLogLog::<WyHash, 12, 6>::new();
                hll.insert_hash(hash);
                hll.get_register(0)
            }
        }
    }

    #[test]
    fn test_merge() {
        let mut lhs = hll_with(0..3_000);
        let rhs = hll_with(2_000..6_000);
        let all = hll_with(0..6_000);
        lhs.merge(&rhs);
        assert_eq!(lhs.data[0], all.data[0]);
        assert_eq!(lhs.data[2..], all.data[2..]);
    }

    #[test]
    fn test_wire_size() {
        let mut bytes = Vec::new();
        HyperLogLog::<WyHash, 4, 5>::new().write(&mut bytes).unwrap();
        // 2 header words and 80 register bits rounded up to 3 words
        assert_eq!(bytes.len(), 5 * 4);

        bytes.clear();
        Hll::new().write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), (2 + 768) * 4);
    }

    #[test]
    fn test_write_read() {
        let hll = hll_with(0..20_000);
        let mut bytes = Vec::new();
        hll.write(&mut bytes).unwrap();

        let mut restored = Hll::new();
        restored.read(&mut bytes.as_slice()).unwrap();
        assert!(restored == hll);
        assert_eq!(restored.estimate(), hll.estimate());
    }

    #[test]
    fn test_read_and_merge() {
        let mut lhs = hll_with(0..1_000);
        let mut streamed = lhs.clone();
        let rhs = hll_with(500..9_000);
        let mut bytes = Vec::new();
        rhs.write(&mut bytes).unwrap();

        lhs.merge(&rhs);
        streamed.read_and_merge(&mut bytes.as_slice()).unwrap();
        assert!(streamed == lhs);
    }

    #[test]
    fn test_read_truncated() {
        let mut bytes = Vec::new();
        hll_with(0..10).write(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(Hll::new().read(&mut bytes.as_slice()).is_err());
        assert!(Hll::new().read_and_merge(&mut bytes.as_slice()).is_err());
    }

    #[test_case(f32::NAN; "nan")]
    #[test_case(f32::INFINITY; "infinity")]
    #[test_case(f32::MIN_POSITIVE; "min positive")]
    #[test_case(0.0; "zero")]
    #[test_case(-4096.0; "negative")]
    #[test_case(4096.0; "empty sum")]
    fn test_read_invalid_sum(sum: f32) {
        let mut bytes = Vec::new();
        hll_with(0..100).write(&mut bytes).unwrap();
        bytes[4..8].copy_from_slice(&sum.to_bits().to_le_bytes());
        let mut hll = Hll::new();
        let err = hll.read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, EstimatorError::Malformed(_)));
        assert_eq!(f32::from_bits(hll.data[1]), hll.harmonic_sum() as f32);
    }

    #[test]
    fn test_read_sum_off_by_one_percent() {
        let hll = hll_with(0..3_000);
        let mut bytes = Vec::new();
        hll.write(&mut bytes).unwrap();
        let sum = f32::from_bits(hll.data[1]) * 1.01;
        bytes[4..8].copy_from_slice(&sum.to_bits().to_le_bytes());
        assert!(Hll::new().read(&mut bytes.as_slice()).is_err());
    }

    #[test_case(0)]
    #[test_case(100)]
    #[test_case(100_000)]
    fn test_incremental_sum_matches_registers(n: u64) {
        let hll = hll_with(0..n);
        let sum = f64::from(f32::from_bits(hll.data[1]));
        let expected = hll.harmonic_sum();
        assert!((sum - expected).abs() <= expected * SUM_TOLERANCE, "{sum} vs {expected}");
    }
}
