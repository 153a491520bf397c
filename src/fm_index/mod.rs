pub mod suffix_array;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::prg::codec::{is_variant_marker, Endianness, Marker};
use crate::utils::errors::{WeaverError, WeaverResult};

use suffix_array::build_suffix_array;

/// Half-open [lo, hi) range over the suffix array. All suffixes in the
/// range share a prefix equal to the current search pattern.
pub type SaInterval = (u64, u64);

const OCC_SAMPLE_RATE: usize = 64;
const INDEX_MAGIC: [u8; 2] = [b'w', b'f'];

/**
 * FM-index over the extended PRG alphabet (DNA bases plus variant markers),
 * with a trailing sentinel smaller than every symbol.
 *
 * Rank support is dense for the four bases (sampled cumulative counts over
 * the BWT) and sparse for the variant markers, whose occurrences are few: a
 * position-sorted list doubles as the marker mask over the BWT and as the
 * rank structure.
 */
pub struct FmIndex {
    text: Vec<Marker>,
    sa: Vec<u64>,
    bwt: Vec<Marker>,
    /// Sorted distinct symbols, with occurrence counts and C-array starts.
    alphabet: Vec<Marker>,
    counts: Vec<u64>,
    starts: Vec<u64>,
    /// Cumulative base counts at every OCC_SAMPLE_RATE BWT positions.
    occ_samples: Vec<[u64; 4]>,
    /// (BWT position, marker) for every variant marker in the BWT, sorted
    /// by position.
    marker_bwt_positions: Vec<(u64, Marker)>,
}

impl FmIndex {
    pub fn build(prg: &[Marker]) -> FmIndex {
        let mut text = Vec::with_capacity(prg.len() + 1);
        text.extend_from_slice(prg);
        text.push(0); // sentinel

        let sa = build_suffix_array(&text);
        let n = text.len();
        let mut bwt = Vec::with_capacity(n);
        for &suffix in &sa {
            let prev = if suffix == 0 { n - 1 } else { suffix as usize - 1 };
            bwt.push(text[prev]);
        }

        let mut alphabet: Vec<Marker> = text.to_vec();
        alphabet.sort_unstable();
        alphabet.dedup();
        let counts: Vec<u64> = alphabet
            .iter()
            .map(|&s| text.iter().filter(|&&c| c == s).count() as u64)
            .collect();
        let mut starts = Vec::with_capacity(alphabet.len());
        let mut running = 0;
        for &c in &counts {
            starts.push(running);
            running += c;
        }

        let (occ_samples, marker_bwt_positions) = build_rank_supports(&bwt);

        FmIndex {
            text,
            sa,
            bwt,
            alphabet,
            counts,
            starts,
            occ_samples,
            marker_bwt_positions,
        }
    }

    /// Length of the indexed text, sentinel included.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn text(&self) -> &[Marker] {
        &self.text
    }

    pub fn bwt(&self) -> &[Marker] {
        &self.bwt
    }

    /// Random access SA[i] -> text position.
    pub fn sa_at(&self, sa_index: u64) -> u64 {
        self.sa[sa_index as usize]
    }

    /// SA interval of all suffixes starting with `symbol`; empty interval
    /// when the symbol does not occur.
    pub fn symbol_interval(&self, symbol: Marker) -> SaInterval {
        match self.alphabet.binary_search(&symbol) {
            Ok(idx) => (self.starts[idx], self.starts[idx] + self.counts[idx]),
            Err(_) => (0, 0),
        }
    }

    /// rank(c, i): occurrences of base c in BWT[0..i). Dense sampled rank.
    pub fn rank_base(&self, base: Marker, i: u64) -> u64 {
        debug_assert!((1..=4).contains(&base));
        let i = i as usize;
        // i may sit one past the final sampled block
        let block = (i / OCC_SAMPLE_RATE).min(self.occ_samples.len() - 1);
        let mut rank = self.occ_samples[block][base as usize - 1];
        for &symbol in &self.bwt[block * OCC_SAMPLE_RATE..i] {
            if symbol == base {
                rank += 1;
            }
        }
        rank
    }

    /// One backward extension step with a DNA base.
    pub fn extend_with_base(&self, base: Marker, interval: SaInterval) -> SaInterval {
        let start = match self.alphabet.binary_search(&base) {
            Ok(idx) => self.starts[idx],
            Err(_) => return (0, 0),
        };
        let lo = start + self.rank_base(base, interval.0);
        let hi = start + self.rank_base(base, interval.1);
        (lo, hi)
    }

    /// All variant markers held in BWT positions of `interval`, as
    /// (SA index, marker) pairs.
    pub fn markers_in_bwt_range(&self, interval: SaInterval) -> &[(u64, Marker)] {
        let lo = self
            .marker_bwt_positions
            .partition_point(|&(pos, _)| pos < interval.0);
        let hi = self
            .marker_bwt_positions
            .partition_point(|&(pos, _)| pos < interval.1);
        &self.marker_bwt_positions[lo..hi]
    }

    /// Serialises the index: a two-byte magic prefix, an endianness byte,
    /// then text, suffix array and the rank supports.
    pub fn write<P: AsRef<Path>>(&self, path: P, endianness: Endianness) -> WeaverResult<()> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        w.write_all(&INDEX_MAGIC)?;
        w.write_u8(match endianness {
            Endianness::Little => 1,
            Endianness::Big => 2,
        })?;
        match endianness {
            Endianness::Little => self.write_body::<LittleEndian, _>(&mut w),
            Endianness::Big => self.write_body::<BigEndian, _>(&mut w),
        }
    }

    fn write_body<B: ByteOrder, W: Write>(&self, w: &mut W) -> WeaverResult<()> {
        w.write_u64::<B>(self.text.len() as u64)?;
        for &s in &self.text {
            w.write_u64::<B>(s)?;
        }
        for &s in &self.sa {
            w.write_u64::<B>(s)?;
        }
        w.write_u64::<B>(self.occ_samples.len() as u64)?;
        for sample in &self.occ_samples {
            for &count in sample {
                w.write_u64::<B>(count)?;
            }
        }
        w.write_u64::<B>(self.marker_bwt_positions.len() as u64)?;
        for &(pos, marker) in &self.marker_bwt_positions {
            w.write_u64::<B>(pos)?;
            w.write_u64::<B>(marker)?;
        }
        Ok(())
    }

    /// Loads a serialised index, detecting endianness from the prefix.
    /// Fails with `CorruptedIndex` when the stored rank supports do not
    /// match the BWT recomputed from the stored text and suffix array.
    pub fn read<P: AsRef<Path>>(path: P) -> WeaverResult<FmIndex> {
        let mut r = BufReader::new(File::open(path.as_ref())?);
        let mut magic = [0u8; 2];
        r.read_exact(&mut magic)?;
        if magic != INDEX_MAGIC {
            return Err(WeaverError::CorruptedIndex(
                "bad magic prefix on FM-index file".to_string(),
            ));
        }
        match r.read_u8()? {
            1 => Self::read_body::<LittleEndian, _>(&mut r),
            2 => Self::read_body::<BigEndian, _>(&mut r),
            other => Err(WeaverError::CorruptedIndex(format!(
                "unknown endianness tag {}",
                other
            ))),
        }
    }

    fn read_body<B: ByteOrder, R: Read>(r: &mut R) -> WeaverResult<FmIndex> {
        let n = r.read_u64::<B>()? as usize;
        let mut text = Vec::with_capacity(n);
        for _ in 0..n {
            text.push(r.read_u64::<B>()?);
        }
        if text.last() != Some(&0) {
            return Err(WeaverError::CorruptedIndex(
                "indexed text does not end with the sentinel".to_string(),
            ));
        }
        let mut sa = Vec::with_capacity(n);
        for _ in 0..n {
            sa.push(r.read_u64::<B>()?);
        }

        let num_samples = r.read_u64::<B>()? as usize;
        let mut occ_samples = Vec::with_capacity(num_samples);
        for _ in 0..num_samples {
            let mut sample = [0u64; 4];
            for slot in sample.iter_mut() {
                *slot = r.read_u64::<B>()?;
            }
            occ_samples.push(sample);
        }
        let num_markers = r.read_u64::<B>()? as usize;
        let mut marker_bwt_positions = Vec::with_capacity(num_markers);
        for _ in 0..num_markers {
            let pos = r.read_u64::<B>()?;
            let marker = r.read_u64::<B>()?;
            marker_bwt_positions.push((pos, marker));
        }

        let rebuilt = FmIndex::build(&text[..n - 1]);
        if rebuilt.sa != sa {
            return Err(WeaverError::CorruptedIndex(
                "stored suffix array does not match the indexed text".to_string(),
            ));
        }
        if rebuilt.occ_samples != occ_samples || rebuilt.marker_bwt_positions != marker_bwt_positions
        {
            return Err(WeaverError::CorruptedIndex(
                "stored rank supports do not match the BWT".to_string(),
            ));
        }
        Ok(rebuilt)
    }
}

fn build_rank_supports(bwt: &[Marker]) -> (Vec<[u64; 4]>, Vec<(u64, Marker)>) {
    let mut occ_samples = Vec::with_capacity(bwt.len() / OCC_SAMPLE_RATE + 1);
    let mut running = [0u64; 4];
    let mut marker_positions = Vec::new();
    for (i, &symbol) in bwt.iter().enumerate() {
        if i % OCC_SAMPLE_RATE == 0 {
            occ_samples.push(running);
        }
        if (1..=4).contains(&symbol) {
            running[symbol as usize - 1] += 1;
        } else if is_variant_marker(symbol) {
            marker_positions.push((i as u64, symbol));
        }
    }
    (occ_samples, marker_positions)
}
