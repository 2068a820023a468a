use rand::Rng;
use std::sync::Arc;
use zkballot::*;

pub fn command_e2e(matches: &clap::ArgMatches, config: ProtocolConfig) {
    let num_voters: usize = matches
        .value_of("voters")
        .unwrap_or_default()
        .parse()
        .unwrap_or_else(|e| crate::exit_with("e2e", format!("invalid voter count: {}", e)));

    let candidates: Vec<String> = matches
        .value_of("candidates")
        .unwrap_or_default()
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let roles = Arc::new(RoleTable::new());
    roles.grant("manager", Role::ElectionManager);
    roles.grant("auditor", Role::Auditor);
    let manager = Principal::from("manager");
    let auditor = Principal::from("auditor");

    let registry = Registry::new(MemStore::new())
        .with_config(config.clone())
        .with_clock(clock.clone())
        .with_authorizer(roles);

    // Eligibility is fixed before the election exists
    let voters: Vec<String> = (0..num_voters)
        .map(|i| format!("voter-{}@example.com", i))
        .collect();
    let tree = EligibilityTree::build(&voters, config.tree_depth)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));

    let (election_secret, election_public) = generate_keypair();
    let start_time = clock.now() + 60;
    let end_time = start_time + config.min_duration;

    let params = ElectionParams {
        title: "Simulated election".into(),
        candidates: candidates.clone(),
        start_time,
        end_time,
        eligibility_root: tree.root(),
        encryption_key: election_public,
        organization: "simulation".into(),
        requires_audit: true,
    };
    let id = registry
        .create_election(&manager, params)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));
    registry
        .activate(&manager, id)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));
    println!("> Election {} created with root {}", id, tree.root());

    clock.set(start_time);
    let election = registry
        .get_election(id)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));

    let mut rng = rand::thread_rng();
    let mut last_submission = None;
    for (index, voter) in voters.iter().enumerate() {
        // Voter side
        let credential = issue_credentials(voter);
        let eligibility = tree
            .prove_membership(index)
            .unwrap_or_else(|| crate::exit_with("e2e", "missing membership proof"));
        let choice = rng.gen_range(0, election.num_candidates());
        let submission = prepare_ballot(
            registry.proof_system(),
            &election,
            &credential,
            choice,
            &eligibility,
        )
        .unwrap_or_else(|e| crate::exit_with("e2e", e));

        // Registry side
        let receipt = registry
            .cast_vote(id, submission.clone())
            .unwrap_or_else(|e| crate::exit_with("e2e", e));
        if matches.is_present("print-votes") {
            println!(
                "  ballot {} nullifier {}",
                receipt.ballot_index, receipt.nullifier_hash
            );
        }
        last_submission = Some(submission);
        clock.advance(1);
    }

    if let Some(replay) = last_submission {
        match registry.cast_vote(id, replay) {
            Err(Error::AlreadyVoted) => println!("> Replayed ballot rejected"),
            other => crate::exit_with("e2e", format!("replayed ballot not rejected: {:?}", other)),
        }
    }

    clock.set(end_time + 1);
    registry
        .end_voting(id)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));
    registry
        .tally(&manager, id, &election_secret)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));
    registry
        .audit(&auditor, id, [0u8; 32], true)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));

    let results = registry
        .get_results(id)
        .unwrap_or_else(|e| crate::exit_with("e2e", e));

    println!("> Election verified OK");
    println!("Tally:");
    for total in results.tally.totals.iter() {
        println!(
            "  {} got {} votes ({}%)",
            total.candidate, total.votes, total.percentage
        );
    }
    if results.tally.rejected > 0 {
        println!("  {} ballots excluded", results.tally.rejected);
    }
    println!("Winners: {}", results.tally.winners.join(", "));
}
