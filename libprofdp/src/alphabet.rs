use phf::phf_map;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UTF8_SPACE: u8 = 32;

pub const AMINO_ALPHABET: [&str; 20] = [
    "A", "C", "D", "E", "F", "G", "H", "I", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "V", "W",
    "Y",
];

pub const AMINO_ALPHABET_WITH_DEGENERATE: [&str; 29] = [
    "A", "C", "D", "E", "F", "G", "H", "I", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "V", "W",
    "Y", "-", "B", "J", "Z", "O", "U", "X", "*", "~",
];

pub const DNA_ALPHABET_WITH_DEGENERATE: [&str; 18] = [
    "A", "C", "G", "T", "-", "R", "Y", "M", "K", "S", "W", "H", "B", "V", "D", "N", "*", "~",
];

pub const UTF8_TO_DIGITAL_AMINO: phf::Map<u8, u8> = phf_map! {
    // upper case
    65u8 => 0,    // A
    67u8 => 1,    // C
    68u8 => 2,    // D
    69u8 => 3,    // E
    70u8 => 4,    // F
    71u8 => 5,    // G
    72u8 => 6,    // H
    73u8 => 7,    // I
    75u8 => 8,    // K
    76u8 => 9,    // L
    77u8 => 10,   // M
    78u8 => 11,   // N
    80u8 => 12,   // P
    81u8 => 13,   // Q
    82u8 => 14,   // R
    83u8 => 15,   // S
    84u8 => 16,   // T
    86u8 => 17,   // V
    87u8 => 18,   // W
    89u8 => 19,   // Y
    // lower case
    97u8 => 0,    // a
    99u8 => 1,    // c
    100u8 => 2,   // d
    101u8 => 3,   // e
    102u8 => 4,   // f
    103u8 => 5,   // g
    104u8 => 6,   // h
    105u8 => 7,   // i
    107u8 => 8,   // k
    108u8 => 9,   // l
    109u8 => 10,  // m
    110u8 => 11,  // n
    112u8 => 12,  // p
    113u8 => 13,  // q
    114u8 => 14,  // r
    115u8 => 15,  // s
    116u8 => 16,  // t
    118u8 => 17,  // v
    119u8 => 18,  // w
    121u8 => 19,  // y
    // gap, degenerate, non-residue and missing data characters
    45u8 => 20,   // -
    46u8 => 20,   // .
    66u8 => 21,   // B
    74u8 => 22,   // J
    90u8 => 23,   // Z
    79u8 => 24,   // O
    85u8 => 25,   // U
    88u8 => 26,   // X
    98u8 => 21,   // b
    106u8 => 22,  // j
    122u8 => 23,  // z
    111u8 => 24,  // o
    117u8 => 25,  // u
    120u8 => 26,  // x
    42u8 => 27,   // *
    126u8 => 28,  // ~
};

pub const UTF8_TO_DIGITAL_DNA: phf::Map<u8, u8> = phf_map! {
    65u8 => 0,    // A
    67u8 => 1,    // C
    71u8 => 2,    // G
    84u8 => 3,    // T
    85u8 => 3,    // U
    97u8 => 0,    // a
    99u8 => 1,    // c
    103u8 => 2,   // g
    116u8 => 3,   // t
    117u8 => 3,   // u
    45u8 => 4,    // -
    46u8 => 4,    // .
    82u8 => 5,    // R
    89u8 => 6,    // Y
    77u8 => 7,    // M
    75u8 => 8,    // K
    83u8 => 9,    // S
    87u8 => 10,   // W
    72u8 => 11,   // H
    66u8 => 12,   // B
    86u8 => 13,   // V
    68u8 => 14,   // D
    78u8 => 15,   // N
    114u8 => 5,   // r
    121u8 => 6,   // y
    109u8 => 7,   // m
    107u8 => 8,   // k
    115u8 => 9,   // s
    119u8 => 10,  // w
    104u8 => 11,  // h
    98u8 => 12,   // b
    118u8 => 13,  // v
    100u8 => 14,  // d
    110u8 => 15,  // n
    42u8 => 16,   // *
    126u8 => 17,  // ~
};

pub const AMINO_BACKGROUND_FREQUENCIES: [f32; 20] = [
    0.0787945, // A
    0.0151600, // C
    0.0535222, // D
    0.0668298, // E
    0.0397062, // F
    0.0695071, // G
    0.0229198, // H
    0.0590092, // I
    0.0594422, // K
    0.0963728, // L
    0.0237718, // M
    0.0414386, // N
    0.0482904, // P
    0.0395639, // Q
    0.0540978, // R
    0.0683364, // S
    0.0540687, // T
    0.0673417, // V
    0.0114135, // W
    0.0304133, // Y
];

pub const DNA_BACKGROUND_FREQUENCIES: [f32; 4] = [0.25, 0.25, 0.25, 0.25];

const AMINO_ALL: [u8; 20] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19,
];
const DNA_ALL: [u8; 4] = [0, 1, 2, 3];

#[derive(Error, Debug)]
#[error("unknown alphabet: {name}")]
pub struct UnknownAlphabetError {
    name: String,
}

#[derive(Error, Debug)]
#[error("unknown alphabet code: {code}")]
pub struct UnknownAlphabetCodeError {
    code: i32,
}

/// The digital alphabet that both a profile and its target sequences are encoded in.
///
/// Digital codes are laid out as `[canonical residues, gap, degenerate residues,
/// non-residue, missing data]`, so the gap code is always equal to the size of
/// the canonical alphabet.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alphabet {
    #[default]
    Amino,
    Dna,
}

impl Alphabet {
    pub fn from_name(name: &str) -> Result<Self, UnknownAlphabetError> {
        match name {
            "amino" => Ok(Alphabet::Amino),
            "dna" | "rna" => Ok(Alphabet::Dna),
            _ => Err(UnknownAlphabetError {
                name: name.to_string(),
            }),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Alphabet::Amino => 3,
            Alphabet::Dna => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, UnknownAlphabetCodeError> {
        match code {
            3 => Ok(Alphabet::Amino),
            2 => Ok(Alphabet::Dna),
            _ => Err(UnknownAlphabetCodeError { code }),
        }
    }

    /// The number of canonical residues, K.
    pub fn size(&self) -> usize {
        match self {
            Alphabet::Amino => 20,
            Alphabet::Dna => 4,
        }
    }

    /// The number of digital codes including gap, degenerate,
    /// non-residue, and missing data characters, Kp.
    pub fn size_with_degenerate(&self) -> usize {
        self.symbols().len()
    }

    pub fn gap_idx(&self) -> usize {
        self.size()
    }

    pub fn non_residue_idx(&self) -> usize {
        self.size_with_degenerate() - 2
    }

    pub fn missing_data_idx(&self) -> usize {
        self.size_with_degenerate() - 1
    }

    /// Returns true for the codes that no state is ever allowed to emit.
    pub fn is_unscorable(&self, digital: usize) -> bool {
        digital == self.gap_idx()
            || digital == self.non_residue_idx()
            || digital == self.missing_data_idx()
    }

    pub fn symbols(&self) -> &'static [&'static str] {
        match self {
            Alphabet::Amino => &AMINO_ALPHABET_WITH_DEGENERATE,
            Alphabet::Dna => &DNA_ALPHABET_WITH_DEGENERATE,
        }
    }

    pub fn background_frequencies(&self) -> &'static [f32] {
        match self {
            Alphabet::Amino => &AMINO_BACKGROUND_FREQUENCIES,
            Alphabet::Dna => &DNA_BACKGROUND_FREQUENCIES,
        }
    }

    pub fn utf8_to_digital(&self, utf8_byte: u8) -> Option<u8> {
        match self {
            Alphabet::Amino => UTF8_TO_DIGITAL_AMINO.get(&utf8_byte).copied(),
            Alphabet::Dna => UTF8_TO_DIGITAL_DNA.get(&utf8_byte).copied(),
        }
    }

    pub fn digital_to_utf8(&self, digital_byte: u8) -> Option<u8> {
        self.symbols()
            .get(digital_byte as usize)
            .map(|symbol| symbol.as_bytes()[0])
    }

    /// The canonical residues that a digital code may stand for.
    ///
    /// Canonical codes map to themselves, and codes that can't be scored map to nothing.
    pub fn degenerate_members(&self, digital: usize) -> &'static [u8] {
        match self {
            Alphabet::Amino => match digital {
                0..=19 => &AMINO_ALL[digital..digital + 1],
                21 => &[2, 11],
                22 => &[7, 9],
                23 => &[3, 13],
                24 => &[8],
                25 => &[1],
                26 => &AMINO_ALL,
                _ => &[],
            },
            Alphabet::Dna => match digital {
                0..=3 => &DNA_ALL[digital..digital + 1],
                5 => &[0, 2],
                6 => &[1, 3],
                7 => &[0, 1],
                8 => &[2, 3],
                9 => &[1, 2],
                10 => &[0, 3],
                11 => &[0, 1, 3],
                12 => &[1, 2, 3],
                13 => &[0, 1, 2],
                14 => &[0, 2, 3],
                15 => &DNA_ALL,
                _ => &[],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn test_special_codes() {
        let amino = Alphabet::Amino;
        check!(amino.size() == 20);
        check!(amino.size_with_degenerate() == 29);
        check!(amino.gap_idx() == 20);
        check!(amino.non_residue_idx() == 27);
        check!(amino.missing_data_idx() == 28);

        let dna = Alphabet::Dna;
        check!(dna.size() == 4);
        check!(dna.size_with_degenerate() == 18);
        check!(dna.gap_idx() == 4);
        check!(dna.non_residue_idx() == 16);
        check!(dna.missing_data_idx() == 17);
    }

    #[test]
    fn test_utf8_round_trip() {
        for alphabet in [Alphabet::Amino, Alphabet::Dna] {
            for (code, symbol) in alphabet.symbols().iter().enumerate() {
                let byte = symbol.as_bytes()[0];
                check!(alphabet.utf8_to_digital(byte) == Some(code as u8));
                check!(alphabet.digital_to_utf8(code as u8) == Some(byte));
            }
        }
    }

    #[test]
    fn test_degenerate_members() {
        let amino = Alphabet::Amino;
        check!(amino.degenerate_members(21) == &[2, 11]);
        check!(amino.degenerate_members(26).len() == 20);
        check!(amino.degenerate_members(amino.gap_idx()).is_empty());
        check!(amino.degenerate_members(5) == &[5]);

        let dna = Alphabet::Dna;
        check!(dna.degenerate_members(15).len() == 4);
        check!(dna.degenerate_members(dna.missing_data_idx()).is_empty());
    }

    #[test]
    fn test_background_sums_to_one() {
        for alphabet in [Alphabet::Amino, Alphabet::Dna] {
            let sum: f32 = alphabet.background_frequencies().iter().sum();
            check!((sum - 1.0).abs() < 1e-4);
        }
    }
}
