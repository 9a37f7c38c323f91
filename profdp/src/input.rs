use anyhow::Context;
use libprofdp::structs::hmm::parse_hmms_from_p7hmm_file;
use libprofdp::structs::{Profile, Sequence};
use thiserror::Error;

use crate::args::ProfileArgs;

#[derive(Error, Debug)]
#[error("models in {path} use more than one alphabet")]
pub struct MixedAlphabetError {
    path: String,
}

/// Read every model and configure it as a profile, then read the targets in the models' alphabet.
pub fn load_inputs(args: &ProfileArgs) -> anyhow::Result<(Vec<Profile>, Vec<Sequence>)> {
    let hmms = parse_hmms_from_p7hmm_file(&args.model_path).context(format!(
        "failed to read models from: {}",
        args.model_path.to_string_lossy()
    ))?;

    let alphabet = match hmms.first() {
        Some(hmm) => hmm.header.alphabet,
        None => anyhow::bail!(
            "no models found in: {}",
            args.model_path.to_string_lossy()
        ),
    };

    if hmms.iter().any(|hmm| hmm.header.alphabet != alphabet) {
        return Err(MixedAlphabetError {
            path: args.model_path.to_string_lossy().to_string(),
        }
        .into());
    }

    let profiles = hmms
        .iter()
        .map(|hmm| Profile::from_hmm(hmm, args.mode, Profile::DEFAULT_TARGET_LENGTH))
        .collect::<anyhow::Result<Vec<Profile>>>()?;

    let targets = Sequence::from_fasta(&args.target_path, alphabet).context(format!(
        "failed to read targets from: {}",
        args.target_path.to_string_lossy()
    ))?;

    log::info!(
        "read {} models and {} targets",
        profiles.len(),
        targets.len()
    );

    Ok((profiles, targets))
}
