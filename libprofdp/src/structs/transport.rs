use std::io::{Read, Write};

use thiserror::Error;

use crate::alphabet::{Alphabet, UnknownAlphabetCodeError};
use crate::structs::profile::{AlignmentMode, ProfileAllocationError};
use crate::structs::Profile;

/// The value sent in place of a model length to tell a receiver to stop.
pub const SHUTDOWN_SENTINEL: i32 = -1;

#[derive(Error, Debug)]
pub enum ProfileDecodeError {
    #[error("profile frame ended early")]
    Truncated(#[source] std::io::Error),
    #[error("invalid model length in profile frame: {0}")]
    Length(i32),
    #[error("unknown alignment mode code in profile frame: {0}")]
    Mode(i32),
    #[error(transparent)]
    Alphabet(#[from] UnknownAlphabetCodeError),
    #[error(transparent)]
    Allocation(#[from] ProfileAllocationError),
    #[error("profile name is not valid UTF-8")]
    Name(#[from] std::string::FromUtf8Error),
}

/// A message read from a profile stream.
#[derive(Debug)]
pub enum ProfileMessage {
    Profile(Box<Profile>),
    Shutdown,
}

/// Writes and reads profiles as fixed-order little-endian frames.
///
/// A frame is, in order: the model length M (i32), the mode code (i32), the
/// alphabet code (i32), the (M+1) x 7 transition scores, the (M+1) x Kp match
/// and insert scores, the loop/move pairs for E, N, J, C and B, the local
/// entry, exit and glocal entry scores, the begin and end probabilities, the
/// local correction flag (i32) and score (f32), the compatibility flag (i32),
/// the target length (i32), the expected J uses (f32), and the name (u32 byte
/// count followed by UTF-8). Every float is an f32. A model length of -1
/// ends the stream and nothing follows it.
pub struct ProfileCodec;

impl ProfileCodec {
    pub fn write_profile(out: &mut impl Write, profile: &Profile) -> std::io::Result<()> {
        let mut data: Vec<u8> = vec![];

        data.extend_from_slice(&(profile.length as i32).to_le_bytes());
        data.extend_from_slice(&profile.mode.code().to_le_bytes());
        data.extend_from_slice(&profile.alphabet.code().to_le_bytes());

        for transitions in &profile.transitions {
            write_f32s(&mut data, transitions);
        }
        for scores in &profile.match_scores {
            write_f32s(&mut data, scores);
        }
        for scores in &profile.insert_scores {
            write_f32s(&mut data, scores);
        }

        for state_idx in [
            Profile::SPECIAL_E_IDX,
            Profile::SPECIAL_N_IDX,
            Profile::SPECIAL_J_IDX,
            Profile::SPECIAL_C_IDX,
            Profile::SPECIAL_B_IDX,
        ] {
            write_f32s(&mut data, &profile.special_transitions[state_idx]);
        }

        write_f32s(&mut data, &profile.entry_scores);
        write_f32s(&mut data, &profile.exit_scores);
        write_f32s(&mut data, &profile.glocal_entry_scores);
        write_f32s(&mut data, &profile.begin);
        write_f32s(&mut data, &profile.end);

        data.extend_from_slice(&(profile.local_correction as i32).to_le_bytes());
        data.extend_from_slice(&profile.local_correction_score.to_le_bytes());
        data.extend_from_slice(&(profile.h2_mode as i32).to_le_bytes());
        data.extend_from_slice(&(profile.target_length as i32).to_le_bytes());
        data.extend_from_slice(&profile.expected_j_uses.to_le_bytes());

        data.extend_from_slice(&(profile.name.len() as u32).to_le_bytes());
        data.extend_from_slice(profile.name.as_bytes());

        out.write_all(&data)
    }

    pub fn write_shutdown(out: &mut impl Write) -> std::io::Result<()> {
        out.write_all(&SHUTDOWN_SENTINEL.to_le_bytes())
    }

    /// Read the next frame: either a profile, or the shutdown sentinel.
    ///
    /// The sentinel cells of a decoded profile are forced back to -inf.
    /// Tables grow only as their rows arrive, so a frame that declares more
    /// than it carries fails as truncated.
    pub fn read_message(input: &mut impl Read) -> Result<ProfileMessage, ProfileDecodeError> {
        let length = read_i32_le(input)?;
        if length == SHUTDOWN_SENTINEL {
            return Ok(ProfileMessage::Shutdown);
        }
        if length < 0 {
            return Err(ProfileDecodeError::Length(length));
        }

        let mode_code = read_i32_le(input)?;
        let mode = AlignmentMode::from_code(mode_code).ok_or(ProfileDecodeError::Mode(mode_code))?;
        let alphabet = Alphabet::from_code(read_i32_le(input)?)?;

        let length = length as usize;
        let nodes = length + 1;
        let kp = alphabet.size_with_degenerate();

        let mut profile = Profile::new(0, alphabet)?;
        profile.length = length;
        profile.mode = mode;

        profile.transitions = read_rows(input, nodes, length, |input| {
            let mut row = [0.0; 7];
            read_f32s(input, &mut row)?;
            Ok(row)
        })?;
        profile.match_scores = read_rows(input, nodes, length, |input| read_score_row(input, kp))?;
        profile.insert_scores = read_rows(input, nodes, length, |input| read_score_row(input, kp))?;

        for state_idx in [
            Profile::SPECIAL_E_IDX,
            Profile::SPECIAL_N_IDX,
            Profile::SPECIAL_J_IDX,
            Profile::SPECIAL_C_IDX,
            Profile::SPECIAL_B_IDX,
        ] {
            read_f32s(input, &mut profile.special_transitions[state_idx])?;
        }

        profile.entry_scores = read_rows(input, nodes, length, |input| read_f32_le(input))?;
        profile.exit_scores = read_rows(input, nodes, length, |input| read_f32_le(input))?;
        profile.glocal_entry_scores = read_rows(input, nodes, length, |input| read_f32_le(input))?;
        profile.begin = read_rows(input, nodes, length, |input| read_f32_le(input))?;
        profile.end = read_rows(input, nodes, length, |input| read_f32_le(input))?;

        profile.local_correction = read_i32_le(input)? != 0;
        profile.local_correction_score = read_f32_le(input)?;
        profile.h2_mode = read_i32_le(input)? != 0;
        profile.target_length = read_i32_le(input)?.max(0) as usize;
        profile.expected_j_uses = read_f32_le(input)?;

        let name_length = read_u32_le(input)?;
        let mut name_bytes: Vec<u8> = vec![];
        input
            .by_ref()
            .take(name_length as u64)
            .read_to_end(&mut name_bytes)
            .map_err(ProfileDecodeError::Truncated)?;
        if name_bytes.len() < name_length as usize {
            return Err(ProfileDecodeError::Truncated(
                std::io::ErrorKind::UnexpectedEof.into(),
            ));
        }
        profile.name = String::from_utf8(name_bytes)?;

        profile.apply_sentinels();
        Ok(ProfileMessage::Profile(Box::new(profile)))
    }
}

fn write_f32s(data: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        data.extend_from_slice(&value.to_le_bytes());
    }
}

fn read_bytes(input: &mut impl Read) -> Result<[u8; 4], ProfileDecodeError> {
    let mut bytes = [0u8; 4];
    input
        .read_exact(&mut bytes)
        .map_err(ProfileDecodeError::Truncated)?;
    Ok(bytes)
}

fn read_i32_le(input: &mut impl Read) -> Result<i32, ProfileDecodeError> {
    Ok(i32::from_le_bytes(read_bytes(input)?))
}

fn read_u32_le(input: &mut impl Read) -> Result<u32, ProfileDecodeError> {
    Ok(u32::from_le_bytes(read_bytes(input)?))
}

fn read_f32_le(input: &mut impl Read) -> Result<f32, ProfileDecodeError> {
    Ok(f32::from_le_bytes(read_bytes(input)?))
}

fn read_f32s(input: &mut impl Read, values: &mut [f32]) -> Result<(), ProfileDecodeError> {
    for value in values.iter_mut() {
        *value = read_f32_le(input)?;
    }
    Ok(())
}

fn read_score_row(input: &mut impl Read, width: usize) -> Result<Vec<f32>, ProfileDecodeError> {
    let mut row = vec![0.0; width];
    read_f32s(input, &mut row)?;
    Ok(row)
}

/// Read `count` rows of a table of a `length` node profile.
fn read_rows<R: Read, T>(
    input: &mut R,
    count: usize,
    length: usize,
    read_row: impl Fn(&mut R) -> Result<T, ProfileDecodeError>,
) -> Result<Vec<T>, ProfileDecodeError> {
    let mut rows = Vec::new();
    for _ in 0..count {
        let row = read_row(input)?;
        rows.try_reserve(1).map_err(|_| ProfileAllocationError { length })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Hmm;
    use assert2::check;

    fn read_profile(input: &mut impl Read) -> anyhow::Result<Profile> {
        match ProfileCodec::read_message(input)? {
            ProfileMessage::Profile(profile) => Ok(*profile),
            ProfileMessage::Shutdown => anyhow::bail!("expected a profile, read a shutdown"),
        }
    }

    fn same_floats(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
    }

    #[test]
    fn test_round_trip_then_shutdown() -> anyhow::Result<()> {
        let hmm = Hmm::random(7, Alphabet::Amino, 99);
        let mut profile = Profile::from_hmm(&hmm, AlignmentMode::UniDual, 250)?;
        profile.local_correction = true;
        profile.local_correction_score = -0.25;

        let mut buffer: Vec<u8> = vec![];
        ProfileCodec::write_profile(&mut buffer, &profile)?;
        ProfileCodec::write_shutdown(&mut buffer)?;

        let mut input = buffer.as_slice();
        let decoded = read_profile(&mut input)?;

        check!(decoded.length == profile.length);
        check!(decoded.mode == profile.mode);
        check!(decoded.alphabet == profile.alphabet);
        check!(decoded.name == profile.name);
        check!(decoded.target_length == 250);
        check!(decoded.local_correction);
        check!(decoded.local_correction_score == -0.25);
        check!(!decoded.h2_mode);
        check!(decoded.special_transitions == profile.special_transitions);
        check!(decoded.transitions == profile.transitions);
        for node_idx in 0..=profile.length {
            check!(same_floats(&decoded.match_scores[node_idx], &profile.match_scores[node_idx]));
            check!(same_floats(&decoded.insert_scores[node_idx], &profile.insert_scores[node_idx]));
        }
        check!(same_floats(&decoded.entry_scores, &profile.entry_scores));
        check!(same_floats(&decoded.glocal_entry_scores, &profile.glocal_entry_scores));
        check!(same_floats(&decoded.exit_scores, &profile.exit_scores));
        check!(same_floats(&decoded.begin, &profile.begin));
        check!(same_floats(&decoded.end, &profile.end));
        check!(decoded.validate(1e-5) == Ok(()));

        check!(let Ok(ProfileMessage::Shutdown) = ProfileCodec::read_message(&mut input));
        Ok(())
    }

    #[test]
    fn test_decode_restores_sentinels() -> anyhow::Result<()> {
        let hmm = Hmm::random(3, Alphabet::Dna, 5);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 10)?;

        let mut buffer: Vec<u8> = vec![];
        ProfileCodec::write_profile(&mut buffer, &profile)?;

        // the first transition score of node 0 follows the three header words
        buffer[12..16].copy_from_slice(&1.5f32.to_le_bytes());

        let decoded = read_profile(&mut buffer.as_slice())?;
        check!(decoded.transitions[0][Profile::MATCH_TO_MATCH_IDX] == f32::NEG_INFINITY);
        Ok(())
    }

    #[test]
    fn test_decode_errors() -> anyhow::Result<()> {
        let hmm = Hmm::random(3, Alphabet::Dna, 5);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 10)?;

        let mut buffer: Vec<u8> = vec![];
        ProfileCodec::write_profile(&mut buffer, &profile)?;

        let truncated = &buffer[..buffer.len() - 3];
        check!(let Err(ProfileDecodeError::Truncated(_)) = ProfileCodec::read_message(&mut &truncated[..]));

        let mut bad_mode = buffer.clone();
        bad_mode[4..8].copy_from_slice(&42i32.to_le_bytes());
        check!(let Err(ProfileDecodeError::Mode(42)) = ProfileCodec::read_message(&mut bad_mode.as_slice()));

        let bad_length = (-7i32).to_le_bytes();
        check!(let Err(ProfileDecodeError::Length(-7)) = ProfileCodec::read_message(&mut &bad_length[..]));

        let mut long_name = buffer.clone();
        let name_start = long_name.len() - profile.name.len() - 4;
        long_name[name_start..name_start + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        check!(let Err(ProfileDecodeError::Truncated(_)) = ProfileCodec::read_message(&mut long_name.as_slice()));
        Ok(())
    }

    #[test]
    fn test_decode_oversized_header_without_payload() -> anyhow::Result<()> {
        let mut header: Vec<u8> = vec![];
        header.extend_from_slice(&100_000_000i32.to_le_bytes());
        header.extend_from_slice(&AlignmentMode::Dual.code().to_le_bytes());
        header.extend_from_slice(&Alphabet::Amino.code().to_le_bytes());
        // a few nodes' worth of transitions, far short of what the header declares
        for _ in 0..3 * 7 {
            header.extend_from_slice(&(-1.0f32).to_le_bytes());
        }

        check!(let Err(ProfileDecodeError::Truncated(_)) = ProfileCodec::read_message(&mut header.as_slice()));

        let mut header = header[..12].to_vec();
        header[0..4].copy_from_slice(&i32::MAX.to_le_bytes());
        check!(let Err(ProfileDecodeError::Truncated(_)) = ProfileCodec::read_message(&mut header.as_slice()));
        Ok(())
    }
}
