use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::alphabet::Alphabet;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use regex::Regex;
use thiserror::Error;

use self::constants::{
    HMM_DELETE_TO_DELETE, HMM_DELETE_TO_MATCH, HMM_INSERT_TO_INSERT, HMM_INSERT_TO_MATCH,
    HMM_MATCH_TO_DELETE, HMM_MATCH_TO_INSERT, HMM_MATCH_TO_MATCH, HMM_NUM_TRANSITIONS,
};

pub mod constants {
    // these constants describe indices of transitions
    pub const HMM_NUM_TRANSITIONS: usize = 7;
    pub const HMM_MATCH_TO_MATCH: usize = 0;
    pub const HMM_MATCH_TO_INSERT: usize = 1;
    pub const HMM_MATCH_TO_DELETE: usize = 2;
    pub const HMM_INSERT_TO_MATCH: usize = 3;
    pub const HMM_INSERT_TO_INSERT: usize = 4;
    pub const HMM_DELETE_TO_MATCH: usize = 5;
    pub const HMM_DELETE_TO_DELETE: usize = 6;
}

// local constants for parsing flags
const P7_HEADER_FORMAT_FLAG: &str = "HMMER3/f";
const P7_HEADER_NAME_FLAG: &str = "NAME";
const P7_HEADER_ACCESSION_FLAG: &str = "ACC";
const P7_HEADER_DESCRIPTION_FLAG: &str = "DESC";
const P7_HEADER_LENGTH_FLAG: &str = "LENG";
const P7_HEADER_MAXL_FLAG: &str = "MAXL";
const P7_HEADER_ALPHABET_FLAG: &str = "ALPH";
const P7_HEADER_CONSENSUS_RESIDUE_FLAG: &str = "CONS";
const P7_HEADER_NSEQ_FLAG: &str = "NSEQ";
const P7_HEADER_EFFN_FLAG: &str = "EFFN";
const P7_BODY_HMM_MODEL_START_FLAG: &str = "HMM";
const P7_BODY_COMPO_FLAG: &str = "COMPO";
const P7_BODY_END_FLAG: &str = "//";

// this static regex is used to find float strings
lazy_static! {
    static ref FLOAT_RE: Regex = Regex::new(r"-*\d\.*\d*(e-?\d+)?").unwrap();
}

enum ParserState {
    Idle,
    Header,
    ModelHead,
    ModelBody,
}

enum ModelParserState {
    TransitionHeader,
    MatchEmissions,
    InsertEmissions,
    StateTransitions,
}

/// An Error that is thrown when the first line of
/// a model is not the HMMER3/f format line
#[derive(Error, Debug)]
#[error("unknown format flag: {flag}")]
struct UnknownFormatFlagError {
    flag: String,
}

/// An Error that is thrown when a yes/no header
/// value is something other than yes or no
#[derive(Error, Debug)]
#[error("expected \"yes\" or \"no\", found: {value}")]
struct YesNoValueError {
    value: String,
}

/// An Error that is thrown when a token parsing function
/// recognizes that the token vector index is out of bounds.
#[derive(Error, Debug)]
#[error("token index out of bounds")]
struct TokenIndexError;

/// An Error that is thrown when a float-like
/// substring can't be found in a token
#[derive(Error, Debug)]
#[error("unable to find a float-like substring")]
struct FloatRegexError;

/// An Error that is thrown when a match emission line
/// carries a node number other than the expected one
#[derive(Error, Debug)]
#[error("mismatched node number: expected {expected}, found {found}")]
struct NodeNumberError {
    expected: usize,
    found: String,
}

/// An Error that is thrown when the number of
/// parsed nodes disagrees with the LENG header
#[derive(Error, Debug)]
#[error("model declares {declared} nodes, but {parsed} were parsed")]
struct ModelLengthError {
    declared: usize,
    parsed: usize,
}

/// Represents the header of the P7HMM.
#[derive(Default, Clone, Debug)]
pub struct Header {
    pub name: String,
    pub version: String,
    pub accession_number: String,
    pub description: String,
    pub has_consensus_residue: bool,
    pub model_length: usize,
    pub max_length: usize,
    pub num_sequences: usize,
    pub effective_num_sequences: f32,
    pub alphabet: Alphabet,
}

/// The core model probabilities.
///
/// Each vector is indexed by node, 0..=M. Node 0 holds the begin state's
/// transitions and the insert emissions of the N-terminal insert state.
#[derive(Default, Clone, Debug)]
pub struct Model {
    pub composition: Vec<f32>,
    pub match_probabilities: Vec<Vec<f32>>,
    pub insert_probabilities: Vec<Vec<f32>>,
    pub transition_probabilities: Vec<Vec<f32>>,
    pub consensus_residues: String,
}

/// The data that describes a complete P7HMM.
#[derive(Default, Clone, Debug)]
pub struct Hmm {
    pub header: Header,
    pub model: Model,
}

impl Hmm {
    pub fn new(alphabet: Alphabet) -> Self {
        let mut hmm = Hmm::default();
        hmm.header.alphabet = alphabet;

        hmm.model
            .match_probabilities
            .push(vec![0.0; alphabet.size()]);
        hmm.model
            .insert_probabilities
            .push(vec![0.0; alphabet.size()]);

        hmm.model
            .transition_probabilities
            .push(vec![0.0f32; HMM_NUM_TRANSITIONS]);

        hmm
    }

    /// The number of nodes in the model, M.
    pub fn length(&self) -> usize {
        self.header.model_length
    }

    /// Sample a model with random emissions and transitions.
    ///
    /// Match emissions are drawn independently per node, insert emissions are
    /// the background, and every node's transition distributions are proper.
    /// The same seed always produces the same model.
    pub fn random(length: usize, alphabet: Alphabet, seed: u64) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut hmm = Hmm::new(alphabet);
        let k = alphabet.size();

        hmm.header.name = format!("random-{seed}");
        hmm.header.model_length = length;
        hmm.header.alphabet = alphabet;

        let mut normalized = |n: usize, rng: &mut Pcg64| -> Vec<f32> {
            let raw: Vec<f32> = (0..n).map(|_| rng.gen::<f32>() + 0.05).collect();
            let sum: f32 = raw.iter().sum();
            raw.into_iter().map(|p| p / sum).collect()
        };

        hmm.model.insert_probabilities[0] = alphabet.background_frequencies().to_vec();
        hmm.model.transition_probabilities[0] = Hmm::random_transitions(&mut rng, &mut normalized);
        // the begin state's delete transitions are fixed by convention
        hmm.model.transition_probabilities[0][HMM_DELETE_TO_MATCH] = 1.0;
        hmm.model.transition_probabilities[0][HMM_DELETE_TO_DELETE] = 0.0;

        for node_idx in 1..=length {
            hmm.model.match_probabilities.push(normalized(k, &mut rng));
            hmm.model
                .insert_probabilities
                .push(alphabet.background_frequencies().to_vec());
            hmm.model
                .transition_probabilities
                .push(Hmm::random_transitions(&mut rng, &mut normalized));

            if node_idx == length {
                let transitions = &mut hmm.model.transition_probabilities[node_idx];
                // there's no node M+1 to delete into
                let match_sum =
                    transitions[HMM_MATCH_TO_MATCH] + transitions[HMM_MATCH_TO_INSERT];
                transitions[HMM_MATCH_TO_MATCH] /= match_sum;
                transitions[HMM_MATCH_TO_INSERT] /= match_sum;
                transitions[HMM_MATCH_TO_DELETE] = 0.0;
                transitions[HMM_DELETE_TO_MATCH] = 1.0;
                transitions[HMM_DELETE_TO_DELETE] = 0.0;
            }
        }

        hmm.model.composition = alphabet.background_frequencies().to_vec();
        hmm.model.consensus_residues = hmm.consensus(0.5);
        hmm
    }

    fn random_transitions(
        rng: &mut Pcg64,
        normalized: &mut impl FnMut(usize, &mut Pcg64) -> Vec<f32>,
    ) -> Vec<f32> {
        let mut transitions = vec![0.0f32; HMM_NUM_TRANSITIONS];
        let from_match = normalized(3, rng);
        let from_insert = normalized(2, rng);
        let from_delete = normalized(2, rng);

        transitions[HMM_MATCH_TO_MATCH] = from_match[0];
        transitions[HMM_MATCH_TO_INSERT] = from_match[1];
        transitions[HMM_MATCH_TO_DELETE] = from_match[2];
        transitions[HMM_INSERT_TO_MATCH] = from_insert[0];
        transitions[HMM_INSERT_TO_INSERT] = from_insert[1];
        transitions[HMM_DELETE_TO_MATCH] = from_delete[0];
        transitions[HMM_DELETE_TO_DELETE] = from_delete[1];
        transitions
    }

    /// The consensus residue at each node: upper case when the
    /// top match emission probability is at least `upper_threshold`.
    pub fn consensus(&self, upper_threshold: f32) -> String {
        let alphabet = self.header.alphabet;

        self.model
            .match_probabilities
            .iter()
            .skip(1)
            .map(|probs| {
                let argmax = crate::util::f32_slice_argmax(probs);
                let residue = alphabet.digital_to_utf8(argmax as u8).unwrap_or(b'?') as char;
                if probs[argmax] >= upper_threshold {
                    residue.to_ascii_uppercase()
                } else {
                    residue.to_ascii_lowercase()
                }
            })
            .collect()
    }
}

pub fn parse_hmms_from_p7hmm_file<P: AsRef<Path>>(path: P) -> Result<Vec<Hmm>> {
    let phmm_file = File::open(&path).with_context(|| {
        format!(
            "failed to open p7hmm file: {}",
            path.as_ref().to_string_lossy()
        )
    })?;
    let phmm_lines = BufReader::new(phmm_file).lines();

    let mut line_number: usize = 0;
    let mut current_model_line_number: usize = 0;

    let mut parser_state = ParserState::Idle;
    let mut body_parser_state = ModelParserState::TransitionHeader;

    let mut hmm_list: Vec<Hmm> = vec![];
    let mut current_hmm = Hmm::default();

    for line in phmm_lines {
        let line = line.with_context(|| {
            format!(
                "failed to read line {} of p7hmm file: {}",
                line_number + 1,
                path.as_ref().to_string_lossy()
            )
        })?;
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let flag: &str = get_token_as_str(&tokens, 0)?;

        match parser_state {
            // if we're idle, we're searching for the next header
            ParserState::Idle => match flag {
                P7_HEADER_FORMAT_FLAG => {
                    current_hmm = Hmm::default();
                    current_hmm.header.version = get_joined_tokens(&tokens, 1)
                        .with_context(|| format!("on line: {line_number}"))?;
                    parser_state = ParserState::Header;
                }
                _ => {
                    return Err(UnknownFormatFlagError {
                        flag: flag.to_string(),
                    })
                    .with_context(|| format!("on line: {line_number}"))
                }
            },
            ParserState::Header => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file header: {}\n         on line: {}\n         with flag: {}",
                        &path.as_ref().to_string_lossy(),
                        line_number,
                        flag
                    )
                };
                match flag {
                    P7_HEADER_NAME_FLAG => {
                        current_hmm.header.name =
                            get_token_as_string(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_ACCESSION_FLAG => {
                        current_hmm.header.accession_number =
                            get_token_as_string(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_DESCRIPTION_FLAG => {
                        current_hmm.header.description =
                            get_joined_tokens(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_LENGTH_FLAG => {
                        current_hmm.header.model_length =
                            get_token_as_usize(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_MAXL_FLAG => {
                        current_hmm.header.max_length =
                            get_token_as_usize(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_ALPHABET_FLAG => {
                        let value = get_token_as_str(&tokens, 1).with_context(error_context)?;
                        current_hmm.header.alphabet =
                            Alphabet::from_name(&value.to_lowercase()).with_context(error_context)?;
                    }
                    P7_HEADER_CONSENSUS_RESIDUE_FLAG => {
                        current_hmm.header.has_consensus_residue =
                            get_token_as_yes_no(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_NSEQ_FLAG => {
                        current_hmm.header.num_sequences =
                            get_token_as_usize(&tokens, 1).with_context(error_context)?;
                    }
                    P7_HEADER_EFFN_FLAG => {
                        current_hmm.header.effective_num_sequences =
                            get_token_as_f32(&tokens, 1).with_context(error_context)?;
                    }
                    P7_BODY_HMM_MODEL_START_FLAG => {
                        let alphabet = current_hmm.header.alphabet;
                        let header = std::mem::take(&mut current_hmm.header);
                        current_hmm = Hmm::new(alphabet);
                        current_hmm.header = header;

                        parser_state = ParserState::ModelHead;
                        body_parser_state = ModelParserState::TransitionHeader;
                    }
                    _ => {
                        // the remaining header lines don't affect scoring
                        log::trace!("skipping p7hmm header flag: {flag}");
                    }
                }
            }
            ParserState::ModelHead => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file: {}\n         on line: {}\n",
                        &path.as_ref().to_string_lossy(),
                        line_number
                    )
                };
                let k = current_hmm.header.alphabet.size();

                match body_parser_state {
                    // the "m->m m->i ..." line
                    ModelParserState::TransitionHeader => {
                        body_parser_state = ModelParserState::MatchEmissions;
                    }
                    // the optional COMPO line stands in for node 0's match emissions
                    ModelParserState::MatchEmissions if flag == P7_BODY_COMPO_FLAG => {
                        current_hmm.model.composition =
                            get_tokens_as_probability_vec(&tokens, 1, k + 1)
                                .with_context(error_context)?;
                        body_parser_state = ModelParserState::InsertEmissions;
                    }
                    ModelParserState::MatchEmissions | ModelParserState::InsertEmissions => {
                        current_hmm.model.insert_probabilities[0] =
                            get_tokens_as_probability_vec(&tokens, 0, k)
                                .with_context(error_context)?;
                        body_parser_state = ModelParserState::StateTransitions;
                    }
                    ModelParserState::StateTransitions => {
                        current_hmm.model.transition_probabilities[0] =
                            get_tokens_as_probability_vec(&tokens, 0, HMM_NUM_TRANSITIONS)
                                .with_context(error_context)?;
                        current_model_line_number = 1;
                        parser_state = ParserState::ModelBody;
                        body_parser_state = ModelParserState::MatchEmissions;
                    }
                }
            }
            ParserState::ModelBody => {
                let error_context = || {
                    format!(
                        "failed to parse p7hmm file body: {}\n         on line: {}\n",
                        &path.as_ref().to_string_lossy(),
                        line_number,
                    )
                };
                let k = current_hmm.header.alphabet.size();

                match flag {
                    P7_BODY_END_FLAG => {
                        // we want it to be model_length + 1 since we are doing 1-indexing
                        let parsed = current_hmm.model.match_probabilities.len() - 1;
                        if parsed != current_hmm.header.model_length {
                            return Err(ModelLengthError {
                                declared: current_hmm.header.model_length,
                                parsed,
                            })
                            .with_context(error_context);
                        }

                        hmm_list.push(std::mem::take(&mut current_hmm));
                        parser_state = ParserState::Idle;
                    }
                    _ => match body_parser_state {
                        ModelParserState::MatchEmissions | ModelParserState::TransitionHeader => {
                            let line_number_flag = current_model_line_number.to_string();

                            if flag != line_number_flag {
                                return Err(NodeNumberError {
                                    expected: current_model_line_number,
                                    found: flag.to_string(),
                                })
                                .with_context(error_context);
                            }

                            current_hmm.model.match_probabilities.push(
                                get_tokens_as_probability_vec(&tokens, 1, k + 1)
                                    .with_context(error_context)?,
                            );

                            // MAP, CONS, RF, MM, CS follow the emissions
                            if let Some(residue) = tokens.get(k + 2) {
                                current_hmm.model.consensus_residues.push_str(residue);
                            }

                            body_parser_state = ModelParserState::InsertEmissions;
                        }
                        ModelParserState::InsertEmissions => {
                            current_hmm.model.insert_probabilities.push(
                                get_tokens_as_probability_vec(&tokens, 0, k)
                                    .with_context(error_context)?,
                            );
                            body_parser_state = ModelParserState::StateTransitions;
                        }
                        ModelParserState::StateTransitions => {
                            current_hmm.model.transition_probabilities.push(
                                get_tokens_as_probability_vec(&tokens, 0, HMM_NUM_TRANSITIONS)
                                    .with_context(error_context)?,
                            );
                            current_model_line_number += 1;
                            body_parser_state = ModelParserState::MatchEmissions;
                        }
                    },
                }
            }
        }
    }
    Ok(hmm_list)
}

fn token_index_check(tokens: &[&str], idx: usize) -> Result<()> {
    if idx >= tokens.len() {
        return Err(TokenIndexError.into());
    }
    Ok(())
}

fn get_token_as_str<'a>(tokens: &'a [&str], idx: usize) -> Result<&'a str> {
    token_index_check(tokens, idx)?;
    Ok(tokens[idx])
}

fn get_token_as_string(tokens: &[&str], idx: usize) -> Result<String> {
    token_index_check(tokens, idx)?;
    Ok(String::from(tokens[idx]))
}

fn get_joined_tokens(tokens: &[&str], idx: usize) -> Result<String> {
    token_index_check(tokens, idx)?;
    Ok(tokens[idx..].join(" "))
}

fn get_token_as_yes_no(tokens: &[&str], idx: usize) -> Result<bool> {
    match get_token_as_str(tokens, idx)? {
        "yes" => Ok(true),
        "no" => Ok(false),
        value => Err(YesNoValueError {
            value: value.to_string(),
        }
        .into()),
    }
}

fn get_token_as_f32(tokens: &[&str], idx: usize) -> Result<f32> {
    token_index_check(tokens, idx)?;

    // * means -ln(0), which is infinity
    if tokens[idx] == "*" {
        return Ok(f32::INFINITY);
    }

    let float_str = match FLOAT_RE.find(tokens[idx]) {
        Some(str) => str,
        None => {
            return Err(FloatRegexError)
                .with_context(|| format!("failed to parse token \"{}\" as f32", tokens[idx]));
        }
    };

    float_str
        .as_str()
        .parse::<f32>()
        .with_context(|| format!("failed to parse token \"{}\" as f32", tokens[idx]))
}

fn get_token_as_usize(tokens: &[&str], idx: usize) -> Result<usize> {
    token_index_check(tokens, idx)?;
    tokens[idx]
        .parse::<usize>()
        .with_context(|| format!("failed to parse token \"{}\" as usize", tokens[idx]))
}

/// Get a string token as a probability, which equates to negating and exponentiating the float.
///
/// This is because in the HMMER3/f P7HMM format, emissions and transitions are written as -ln(P).
fn get_token_as_probability(tokens: &[&str], idx: usize) -> Result<f32> {
    let float = get_token_as_f32(tokens, idx)?;
    Ok((-float).exp())
}

/// Get a collection of string tokens as a vector of probabilities, which equates
/// to negating and exponentiating the floats.
fn get_tokens_as_probability_vec(tokens: &[&str], start: usize, end: usize) -> Result<Vec<f32>> {
    let mut vec: Vec<f32> = vec![];
    for i in start..end {
        vec.push(get_token_as_probability(tokens, i)?)
    }
    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use std::io::Write;

    const DNA_MODEL: &str = "HMMER3/f [3.3 | Nov 2019]
NAME  tiny
ACC   PF00001.1
DESC  a tiny test model
LENG  2
ALPH  dna
RF    no
MM    no
CONS  yes
CS    no
MAP   yes
NSEQ  3
EFFN  3.000000
STATS LOCAL MSV       -5.0  0.7
HMM          A        C        G        T
            m->m     m->i     m->d     i->m     i->i     d->m     d->d
  COMPO   1.38629  1.38629  1.38629  1.38629
          1.38629  1.38629  1.38629  1.38629
          0.10536  2.99573  2.99573  0.69315  0.69315  0.00000        *
      1   0.22314  2.30259  2.30259  2.30259      1 a - - -
          1.38629  1.38629  1.38629  1.38629
          0.10536  2.99573  2.99573  0.69315  0.69315  0.69315  0.69315
      2   2.30259  2.30259  0.22314  2.30259      2 g - - -
          1.38629  1.38629  1.38629  1.38629
          0.05129  2.99573        *  0.69315  0.69315  0.00000        *
//
";

    fn write_model(contents: &str, name: &str) -> anyhow::Result<std::path::PathBuf> {
        let path = std::env::temp_dir().join(format!("{}-{name}.hmm", std::process::id()));
        let mut file = File::create(&path)?;
        file.write_all(contents.as_bytes())?;
        Ok(path)
    }

    #[test]
    fn test_parse_dna_model() -> anyhow::Result<()> {
        let path = write_model(DNA_MODEL, "dna")?;
        let hmms = parse_hmms_from_p7hmm_file(&path)?;
        std::fs::remove_file(&path)?;

        check!(hmms.len() == 1);
        let hmm = &hmms[0];
        check!(hmm.header.name == "tiny");
        check!(hmm.header.accession_number == "PF00001.1");
        check!(hmm.header.description == "a tiny test model");
        check!(hmm.header.alphabet == Alphabet::Dna);
        check!(hmm.length() == 2);
        check!(hmm.model.match_probabilities.len() == 3);
        check!(hmm.model.consensus_residues == "ag");

        check!((hmm.model.match_probabilities[1][0] - 0.8).abs() < 1e-4);
        check!((hmm.model.transition_probabilities[0][HMM_MATCH_TO_MATCH] - 0.9).abs() < 1e-4);
        check!(hmm.model.transition_probabilities[0][HMM_DELETE_TO_DELETE] == 0.0);
        check!(hmm.model.transition_probabilities[2][HMM_MATCH_TO_DELETE] == 0.0);
        Ok(())
    }

    #[test]
    fn test_parse_length_mismatch() -> anyhow::Result<()> {
        let contents = DNA_MODEL.replace("LENG  2", "LENG  3");
        let path = write_model(&contents, "mismatch")?;
        let result = parse_hmms_from_p7hmm_file(&path);
        std::fs::remove_file(&path)?;

        check!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_random_hmm_is_proper() {
        let hmm = Hmm::random(12, Alphabet::Amino, 42);
        check!(hmm.length() == 12);
        check!(hmm.model.consensus_residues.len() == 12);

        for node_idx in 1..=12 {
            let emission_sum: f32 = hmm.model.match_probabilities[node_idx].iter().sum();
            check!((emission_sum - 1.0).abs() < 1e-5);

            let t = &hmm.model.transition_probabilities[node_idx];
            let match_sum =
                t[HMM_MATCH_TO_MATCH] + t[HMM_MATCH_TO_INSERT] + t[HMM_MATCH_TO_DELETE];
            check!((match_sum - 1.0).abs() < 1e-5);
            check!((t[HMM_INSERT_TO_MATCH] + t[HMM_INSERT_TO_INSERT] - 1.0).abs() < 1e-5);
        }

        let again = Hmm::random(12, Alphabet::Amino, 42);
        check!(again.model.match_probabilities == hmm.model.match_probabilities);
    }
}
