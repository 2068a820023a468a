use std::str::FromStr;
use zkballot::*;

pub fn command_vote(matches: &clap::ArgMatches, config: &ProtocolConfig) {
    let election_id = ElectionId::from_str(&crate::expand(
        matches.value_of("election-id").unwrap_or_default(),
    ))
    .unwrap_or_else(|e| crate::exit_with("vote", e));

    let num_candidates: u32 = matches
        .value_of("candidates")
        .unwrap_or_default()
        .parse()
        .unwrap_or_else(|e| crate::exit_with("vote", format!("invalid candidate count: {}", e)));

    let candidate: u32 = matches
        .value_of("CANDIDATE")
        .unwrap_or_default()
        .parse()
        .unwrap_or_else(|e| crate::exit_with("vote", format!("invalid candidate: {}", e)));

    let election_key = ElectionPublicKey::from_str(&crate::expand(
        matches.value_of("key").unwrap_or_default(),
    ))
    .unwrap_or_else(|e| crate::exit_with("vote", e));

    let credential: VoterCredential =
        crate::read_input("vote", matches.value_of("CREDENTIAL").unwrap_or_default());
    let eligibility: EligibilityProof =
        crate::read_input("vote", matches.value_of("ELIGIBILITY").unwrap_or_default());

    let context = BallotContext {
        election_id,
        num_candidates,
        tree_depth: config.tree_depth,
    };

    let encrypted_vote =
        encrypt_vote(&election_key, candidate).unwrap_or_else(|e| crate::exit_with("vote", e));

    let proof = generate_vote_proof(
        &SchnorrProofSystem,
        &credential,
        candidate,
        &eligibility,
        &context,
        &encrypted_vote,
    )
    .unwrap_or_else(|e| crate::exit_with("vote", e));

    let submission = BallotSubmission {
        commitment: proof.commitment.clone(),
        encrypted_vote,
        nullifier_hash: proof.nullifier_hash.clone(),
        proof,
    };

    crate::print_json("vote", &submission);
}
