use seq_io::fasta::{Reader, Record};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

use crate::alphabet::{Alphabet, UTF8_SPACE};
use anyhow::{Context, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("unknown UTF8 sequence byte: {byte}")]
pub struct UnknownUtf8SequenceByteError {
    byte: u8,
}

#[derive(Error, Debug)]
#[error("unknown digital sequence byte: {byte}")]
pub struct UnknownDigitalSequenceByteError {
    byte: u8,
}

/// This holds the both the "digital" data and string data of a biological sequence.
pub struct Sequence {
    /// The name of the sequence
    pub name: String,
    /// The sequence details. If the sequence comes from a fasta, this
    /// is the information following the sequence name in the header
    pub details: Option<String>,
    /// The length of the sequence
    pub length: usize,
    /// The "digital" data of the sequence. These are the string bytes mapped
    /// to alphabet codes, with a padding byte at index 0 so that residue i
    /// lives at index i
    pub digital_bytes: Vec<u8>,
    /// The string data of the sequence, padded the same way
    pub utf8_bytes: Vec<u8>,
    pub alphabet: Alphabet,
}

impl Sequence {
    pub fn from_fasta<P: AsRef<Path>>(path: P, alphabet: Alphabet) -> Result<Vec<Self>> {
        let mut seqs: Vec<Self> = vec![];

        let mut reader = Reader::from_path(&path).with_context(|| {
            format!(
                "failed to open fasta file: {}",
                path.as_ref().to_string_lossy()
            )
        })?;

        while let Some(record) = reader.next() {
            let record = record.with_context(|| "failed to read fasta record")?;
            let mut header_bytes = record.head().to_vec();
            let first_space_idx = header_bytes.iter().position(|&b| b == UTF8_SPACE);

            let error_context: fn() -> &'static str =
                || "failed to create String from fasta header bytes";

            let (name, details) = match first_space_idx {
                Some(idx) => {
                    let details_bytes = header_bytes.split_off(idx + 1);
                    header_bytes.pop();
                    (
                        String::from_utf8(header_bytes).with_context(error_context)?,
                        Some(String::from_utf8(details_bytes).with_context(error_context)?),
                    )
                }
                None => (
                    String::from_utf8(header_bytes).with_context(error_context)?,
                    None,
                ),
            };

            let residues: Vec<u8> = record.seq_lines().flatten().copied().collect();
            let mut seq = Sequence::from_utf8(&residues, alphabet)
                .with_context(|| format!("failed to digitize fasta record: {name}"))?;
            seq.name = name;
            seq.details = details;

            seqs.push(seq);
        }
        Ok(seqs)
    }

    pub fn from_digital(bytes: &[u8], alphabet: Alphabet) -> Result<Self> {
        // We want position 1 of the sequence to be at index 1, so we'll buffer with 255
        let mut digital_bytes: Vec<u8> = vec![255; bytes.len() + 1];
        digital_bytes[1..].copy_from_slice(bytes);
        let mut utf8_bytes: Vec<u8> = vec![255; digital_bytes.len()];

        for (idx, digital_byte) in digital_bytes[1..].iter().enumerate() {
            utf8_bytes[idx + 1] = match alphabet.digital_to_utf8(*digital_byte) {
                Some(b) => b,
                None => {
                    return Err(UnknownDigitalSequenceByteError {
                        byte: *digital_byte,
                    }
                    .into())
                }
            };
        }

        Ok(Sequence {
            name: "".to_string(),
            details: None,
            length: bytes.len(),
            digital_bytes,
            utf8_bytes,
            alphabet,
        })
    }

    pub fn from_utf8(bytes: &[u8], alphabet: Alphabet) -> Result<Self> {
        let mut utf8_bytes: Vec<u8> = vec![255; bytes.len() + 1];
        utf8_bytes[1..].copy_from_slice(bytes);
        let mut digital_bytes: Vec<u8> = vec![255; utf8_bytes.len()];

        for (idx, utf8_byte) in utf8_bytes[1..].iter().enumerate() {
            digital_bytes[idx + 1] = match alphabet.utf8_to_digital(*utf8_byte) {
                Some(b) => b,
                None => return Err(UnknownUtf8SequenceByteError { byte: *utf8_byte }.into()),
            };
        }

        Ok(Sequence {
            name: "".to_string(),
            details: None,
            length: bytes.len(),
            digital_bytes,
            utf8_bytes,
            alphabet,
        })
    }

    /// Sample an i.i.d. sequence of canonical residues from the alphabet's background frequencies.
    pub fn random(length: usize, alphabet: Alphabet, seed: u64) -> Result<Self> {
        let mut rng = Pcg64::seed_from_u64(seed);
        let distribution = WeightedIndex::new(alphabet.background_frequencies())
            .context("failed to build background distribution")?;

        let bytes: Vec<u8> = (0..length)
            .map(|_| distribution.sample(&mut rng) as u8)
            .collect();

        let mut seq = Sequence::from_digital(&bytes, alphabet)?;
        seq.name = format!("random-{seed}");
        Ok(seq)
    }

    /// The digital residue at sequence position `idx`, 1-indexed.
    #[inline(always)]
    pub fn residue(&self, idx: usize) -> usize {
        self.digital_bytes[idx] as usize
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, ">{}", self.name)?;

        if let Some(ref details) = self.details {
            write!(f, " {details}")?
        };

        writeln!(f)?;

        // skip the padding byte
        let mut iter = self.utf8_bytes[1..].chunks(80).peekable();

        while let Some(byte_chunk) = iter.next() {
            match std::str::from_utf8(byte_chunk) {
                Ok(seq_line) => {
                    write!(f, "{}", seq_line)?;
                    if iter.peek().is_some() {
                        // if we're not on the last
                        // line, add a linebreak
                        writeln!(f)?;
                    }
                }
                Err(_) => return Err(std::fmt::Error),
            }
        }
        Ok(())
    }
}

impl Debug for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.utf8_bytes[1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn test_from_utf8() -> anyhow::Result<()> {
        let seq = Sequence::from_utf8(b"ACDxB~", Alphabet::Amino)?;
        check!(seq.length == 6);
        check!(seq.digital_bytes == vec![255, 0, 1, 2, 26, 21, 28]);
        check!(seq.residue(1) == 0);

        let seq = Sequence::from_utf8(b"ACGTN", Alphabet::Dna)?;
        check!(seq.digital_bytes[1..] == [0, 1, 2, 3, 15]);
        Ok(())
    }

    #[test]
    fn test_unknown_byte() {
        check!(Sequence::from_utf8(b"AC1", Alphabet::Amino).is_err());
        check!(Sequence::from_utf8(b"ACE", Alphabet::Dna).is_err());
        check!(Sequence::from_digital(&[0, 40], Alphabet::Amino).is_err());
    }

    #[test]
    fn test_random_is_reproducible() -> anyhow::Result<()> {
        let a = Sequence::random(50, Alphabet::Amino, 7)?;
        let b = Sequence::random(50, Alphabet::Amino, 7)?;
        check!(a.length == 50);
        check!(a.digital_bytes == b.digital_bytes);
        check!(a.digital_bytes[1..].iter().all(|&r| r < 20));
        Ok(())
    }

    #[test]
    fn test_display() -> anyhow::Result<()> {
        let mut seq = Sequence::from_utf8(b"ACGT", Alphabet::Dna)?;
        seq.name = "seq1".to_string();
        check!(format!("{seq}") == ">seq1\nACGT");
        Ok(())
    }
}
