use std::collections::BTreeSet;
use std::str::FromStr;
use zkballot::*;

pub fn command_verify(matches: &clap::ArgMatches) {
    let election_id = ElectionId::from_str(&crate::expand(
        matches.value_of("election-id").unwrap_or_default(),
    ))
    .unwrap_or_else(|e| crate::exit_with("verify", e));

    let root = FieldElement::from_str(&crate::expand(matches.value_of("root").unwrap_or_default()))
        .unwrap_or_else(|e| crate::exit_with("verify", e));

    let submission: BallotSubmission =
        crate::read_input("verify", matches.value_of("SUBMISSION").unwrap_or_default());

    let mut verification = verify_vote_proof(
        &SchnorrProofSystem,
        &submission.proof,
        &root,
        election_id,
        &BTreeSet::new(),
    );
    if !submission.is_consistent() && !verification.errors.contains(&ProofError::InvalidZKProof) {
        verification.errors.push(ProofError::InvalidZKProof);
        verification.valid = false;
    }

    crate::print_json("verify", &verification);
    if !verification.valid {
        std::process::exit(1);
    }
}
