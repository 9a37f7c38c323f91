use std::io::{stdout, BufWriter, Write};

use anyhow::Context;
use colored::Colorize;
use libprofdp::align::structs::{DpMatrix, Trace};
use libprofdp::align::{backward, forward, optimal_accuracy, posterior, viterbi};

use crate::args::{Algorithm, DumpArgs};
use crate::input::load_inputs;

pub fn dump(args: &DumpArgs) -> anyhow::Result<()> {
    let (mut profiles, targets) = load_inputs(&args.profile_args)?;

    let profile = profiles.first_mut().context("no models to dump")?;
    let target = targets.first().context("no targets to dump")?;
    profile.configure_for_target_length(target.length);

    log::debug!(
        "dumping {} matrix of {} x {}",
        args.algorithm,
        profile.name,
        target.name
    );

    let mut forward_matrix = DpMatrix::default();
    let mut backward_matrix = DpMatrix::default();
    let mut posterior_matrix = DpMatrix::default();
    let mut trace = Trace::default();

    let matrix = match args.algorithm {
        Algorithm::Forward => {
            forward(profile, target, &mut forward_matrix)?;
            forward_matrix
        }
        Algorithm::Backward => {
            backward(profile, target, &mut backward_matrix)?;
            backward_matrix
        }
        Algorithm::Decoding | Algorithm::Alignment => {
            forward(profile, target, &mut forward_matrix)?;
            backward(profile, target, &mut backward_matrix)?;
            posterior(profile, &forward_matrix, &backward_matrix, &mut posterior_matrix)?;

            if args.algorithm == Algorithm::Decoding {
                posterior_matrix
            } else {
                let mut alignment_matrix = DpMatrix::default();
                optimal_accuracy(
                    profile,
                    &posterior_matrix,
                    args.profile_args.gamma,
                    &mut alignment_matrix,
                    &mut trace,
                )?;
                alignment_matrix
            }
        }
        Algorithm::Viterbi => {
            let mut viterbi_matrix = DpMatrix::default();
            viterbi(profile, target, &mut viterbi_matrix, Some(&mut trace))?;
            viterbi_matrix
        }
    };

    let mut out = BufWriter::new(stdout().lock());

    if args.csv {
        matrix.dump_csv(&mut out)?;
    } else {
        writeln!(
            out,
            "{} {} x {}",
            "#".dimmed(),
            profile.name.bold(),
            target.name.bold()
        )?;
        match args.window.as_deref() {
            Some(&[i0, i1, k0, k1]) => matrix.dump_window(&mut out, i0, i1, k0, k1)?,
            _ => matrix.dump(&mut out)?,
        }

        if !trace.is_empty() {
            writeln!(out)?;
            trace.dump(&mut out, profile, target)?;
        }
    }

    out.flush()?;
    Ok(())
}
