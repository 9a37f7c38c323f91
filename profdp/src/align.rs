use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::anyhow;
use colored::Colorize;
use libprofdp::align::structs::{DpMatrix, Trace};
use libprofdp::align::{backward, bit_score, forward, optimal_accuracy, posterior, viterbi};
use libprofdp::structs::{AlignmentMode, Profile, Sequence};
use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
use serde::Serialize;
use thread_local::ThreadLocal;

use crate::args::AlignArgs;
use crate::input::load_inputs;
use crate::util::writer_or_stdout;

/// The matrices and traces one worker thread reuses for every pair it aligns.
#[derive(Default)]
struct Workspace {
    forward_matrix: DpMatrix,
    backward_matrix: DpMatrix,
    posterior_matrix: DpMatrix,
    alignment_matrix: DpMatrix,
    viterbi_matrix: DpMatrix,
    alignment_trace: Trace,
    viterbi_trace: Trace,
}

#[derive(Serialize)]
pub struct AlignmentSummary {
    pub profile: String,
    pub target: String,
    pub profile_length: usize,
    pub target_length: usize,
    pub mode: AlignmentMode,
    /// Nats
    pub forward_score: f32,
    /// Nats
    pub backward_score: f32,
    pub bit_score: f32,
    /// Nats
    pub viterbi_score: f32,
    pub alignment_gain: f32,
    pub expected_accuracy: f32,
    pub domains: usize,
    pub validated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    pub trace: Trace,
}

impl AlignmentSummary {
    pub const TAB_HEADER: &'static str =
        "profile\ttarget\tM\tL\tmode\tforward\tbackward\tbits\tviterbi\tgain\taccuracy\tdomains\tvalid";

    pub fn tab_string(&self) -> String {
        let valid = if !self.validated {
            "-".normal()
        } else if self.validation_errors.is_empty() {
            "ok".green()
        } else {
            "FAIL".red()
        };

        format!(
            "{}\t{}\t{}\t{}\t{}\t{:.4}\t{:.4}\t{:.2}\t{:.4}\t{:.3}\t{:.3}\t{}\t{}",
            self.profile,
            self.target,
            self.profile_length,
            self.target_length,
            self.mode,
            self.forward_score,
            self.backward_score,
            self.bit_score,
            self.viterbi_score,
            self.alignment_gain,
            self.expected_accuracy,
            self.domains,
            valid
        )
    }
}

/// Run Forward, Backward, Decoding, the optimal accuracy alignment and Viterbi on one pair.
///
/// Returns `None` when no path through the profile emits the target.
fn align_pair(
    profile: &Profile,
    target: &Sequence,
    workspace: &mut Workspace,
    gamma: f32,
    validate: bool,
) -> anyhow::Result<Option<AlignmentSummary>> {
    let forward_score = forward(profile, target, &mut workspace.forward_matrix)?;
    if !forward_score.value().is_finite() {
        log::warn!(
            "no path through {} emits {}; skipping",
            profile.name,
            target.name
        );
        return Ok(None);
    }

    let backward_score = backward(profile, target, &mut workspace.backward_matrix)?;

    posterior(
        profile,
        &workspace.forward_matrix,
        &workspace.backward_matrix,
        &mut workspace.posterior_matrix,
    )?;

    let alignment_gain = optimal_accuracy(
        profile,
        &workspace.posterior_matrix,
        gamma,
        &mut workspace.alignment_matrix,
        &mut workspace.alignment_trace,
    )?;

    let viterbi_score = viterbi(
        profile,
        target,
        &mut workspace.viterbi_matrix,
        Some(&mut workspace.viterbi_trace),
    )?;

    let mut validation_errors: Vec<String> = vec![];
    if validate {
        if let Err(err) = profile.validate(1e-4) {
            validation_errors.push(format!("profile: {err}"));
        }
        for matrix in [
            &workspace.forward_matrix,
            &workspace.backward_matrix,
            &workspace.posterior_matrix,
            &workspace.alignment_matrix,
            &workspace.viterbi_matrix,
        ] {
            if let Err(err) = matrix.validate() {
                validation_errors.push(err.to_string());
            }
        }
    }

    Ok(Some(AlignmentSummary {
        profile: profile.name.clone(),
        target: target.name.clone(),
        profile_length: profile.length,
        target_length: target.length,
        mode: profile.mode,
        forward_score: forward_score.value(),
        backward_score: backward_score.value(),
        bit_score: bit_score(forward_score, target.length).value(),
        viterbi_score: viterbi_score.value(),
        alignment_gain,
        expected_accuracy: workspace.alignment_trace.expected_accuracy(),
        domains: workspace.alignment_trace.domain_count(),
        validated: validate,
        validation_errors,
        trace: workspace.alignment_trace.clone(),
    }))
}

pub fn align(args: &AlignArgs) -> anyhow::Result<()> {
    let (mut profiles, targets) = load_inputs(&args.profile_args)?;

    if args.output_path.is_some() {
        colored::control::set_override(false);
    }

    let writer: Mutex<Box<dyn Write + Send>> =
        Mutex::new(writer_or_stdout(args.output_path.as_ref())?);

    if !args.json {
        let mut writer = writer
            .lock()
            .map_err(|_| anyhow!("results writer mutex was poisoned"))?;
        writeln!(writer, "{}", AlignmentSummary::TAB_HEADER.bold())?;
    }

    let invalid_count = AtomicUsize::new(0);
    let thread_local_workspace: ThreadLocal<RefCell<Workspace>> = ThreadLocal::new();

    profiles
        .par_iter_mut()
        .panic_fuse()
        .try_for_each(|profile| -> anyhow::Result<()> {
            let mut workspace = thread_local_workspace
                .get_or(|| RefCell::new(Workspace::default()))
                .borrow_mut();

            let mut summaries: Vec<AlignmentSummary> = vec![];
            for target in &targets {
                profile.configure_for_target_length(target.length);

                let summary = align_pair(
                    profile,
                    target,
                    &mut workspace,
                    args.profile_args.gamma,
                    args.validate,
                )?;

                if let Some(summary) = summary {
                    if !summary.validation_errors.is_empty() {
                        invalid_count.fetch_add(1, Ordering::Relaxed);
                        for err in &summary.validation_errors {
                            log::warn!("{} x {}: {err}", summary.profile, summary.target);
                        }
                    }
                    summaries.push(summary);
                }
            }

            let mut writer = writer
                .lock()
                .map_err(|_| anyhow!("results writer mutex was poisoned"))?;
            for summary in &summaries {
                if args.json {
                    serde_json::to_writer(&mut *writer, summary)?;
                    writeln!(writer)?;
                } else {
                    writeln!(writer, "{}", summary.tab_string())?;
                }
            }
            Ok(())
        })?;

    writer
        .lock()
        .map_err(|_| anyhow!("results writer mutex was poisoned"))?
        .flush()?;

    let invalid_count = invalid_count.into_inner();
    if invalid_count > 0 {
        anyhow::bail!("{invalid_count} alignments failed validation");
    }

    Ok(())
}
