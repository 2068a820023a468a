use super::*;
use std::sync::Arc;
use std::thread;

const T0: u64 = 1_700_000_000;
const VOTERS: [&str; 3] = ["alice@example.com", "bob@example.com", "carol@example.com"];

struct Harness {
    registry: Arc<Registry<MemStore>>,
    clock: Arc<ManualClock>,
    events: Arc<MemEventLog>,
    manager: Principal,
    admin: Principal,
    auditor: Principal,
    election_secret: ElectionSecretKey,
    election_public: ElectionPublicKey,
    tree: EligibilityTree,
    credentials: Vec<VoterCredential>,
}

fn harness_with(features: FeatureSet) -> Harness {
    let clock = Arc::new(ManualClock::new(T0 - 100));
    let events = Arc::new(MemEventLog::new());
    let roles = Arc::new(RoleTable::new());
    roles.grant("manager", Role::ElectionManager);
    roles.grant("admin", Role::Admin);
    roles.grant("auditor", Role::Auditor);

    let registry = Registry::new(MemStore::new())
        .with_features(features)
        .with_clock(clock.clone())
        .with_events(events.clone())
        .with_authorizer(roles);

    let (election_secret, election_public) = generate_keypair();
    let (_, tree) = build_tree(&VOTERS).unwrap();

    // Each voter holds a credential issued on their own device
    let credentials = VOTERS
        .iter()
        .enumerate()
        .map(|(i, voter)| VoterCredential::from_secret(voter, [i as u8 + 11; SECRET_LENGTH]))
        .collect();

    Harness {
        registry: Arc::new(registry),
        clock,
        events,
        manager: "manager".into(),
        admin: "admin".into(),
        auditor: "auditor".into(),
        election_secret,
        election_public,
        tree,
        credentials,
    }
}

fn harness() -> Harness {
    harness_with(FeatureSet::governed())
}

impl Harness {
    fn params(&self, requires_audit: bool) -> ElectionParams {
        ElectionParams {
            title: "Chair".into(),
            candidates: vec!["A".into(), "B".into()],
            start_time: T0,
            end_time: T0 + 3600,
            eligibility_root: self.tree.root(),
            encryption_key: self.election_public,
            organization: "acme".into(),
            requires_audit,
        }
    }

    fn open_election(&self, requires_audit: bool) -> ElectionId {
        let id = self
            .registry
            .create_election(&self.manager, self.params(requires_audit))
            .unwrap();
        self.registry.activate(&self.manager, id).unwrap();
        self.clock.set(T0 + 10);
        id
    }

    fn submission(&self, id: ElectionId, voter: usize, candidate: u32) -> BallotSubmission {
        let election = self.registry.get_election(id).unwrap();
        let eligibility = self.tree.prove_membership(voter).unwrap();
        prepare_ballot(
            &SchnorrProofSystem,
            &election,
            &self.credentials[voter],
            candidate,
            &eligibility,
        )
        .unwrap()
    }

    fn close_and_tally(&self, id: ElectionId) -> TallyResult {
        self.clock.set(T0 + 3601);
        self.registry.end_voting(id).unwrap();
        self.registry
            .tally(&self.manager, id, &self.election_secret)
            .unwrap()
    }
}

#[test]
fn end_to_end_election() {
    let h = harness();
    let id = h.open_election(false);
    assert_eq!(id, ElectionId(1));

    // Voter 2 picks candidate 1
    let receipt = h.registry.cast_vote(id, h.submission(id, 2, 1)).unwrap();
    assert_eq!(receipt.ballot_index, 0);
    assert_eq!(receipt.nullifier_hash, h.credentials[2].nullifier);
    assert!(h.registry.has_voted(id, &h.credentials[2].nullifier).unwrap());
    assert!(!h.registry.has_voted(id, &h.credentials[0].nullifier).unwrap());

    // Results stay sealed until tallied
    assert!(matches!(h.registry.get_results(id), Err(Error::ElectionNotEnded)));

    let tally = h.close_and_tally(id);
    assert_eq!(tally.counted, 1);
    assert_eq!(tally.rejected, 0);

    let results = h.registry.get_results(id).unwrap();
    assert_eq!(
        results.pairs(),
        vec![("A".to_string(), 0), ("B".to_string(), 1)]
    );
    assert_eq!(results.tally.winners, vec!["B".to_string()]);
    assert!(results.audit.is_none());

    // The event log carries the nullifier but nothing that identifies the voter
    let events = h.events.events();
    assert!(events.contains(&Event::VoteCast {
        election_id: id,
        nullifier: h.credentials[2].nullifier.clone(),
        timestamp: T0 + 10,
    }));
    let log = serde_json::to_string(&events).unwrap();
    assert!(!log.contains(&h.credentials[2].identity.to_string()));
    assert!(!log.contains(VOTERS[2]));
}

#[test]
fn replay_is_rejected() {
    let h = harness();
    let id = h.open_election(false);

    let submission = h.submission(id, 0, 0);
    h.registry.cast_vote(id, submission.clone()).unwrap();
    assert!(matches!(
        h.registry.cast_vote(id, submission),
        Err(Error::AlreadyVoted)
    ));

    // A fresh proof with the same credential is still the same nullifier
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 0, 1)),
        Err(Error::AlreadyVoted)
    ));
    assert_eq!(h.registry.ballot_count(id).unwrap(), 1);
}

#[test]
fn ineligible_voter_is_rejected() {
    let h = harness();
    let id = h.open_election(false);

    let outsiders = ["mallory@example.com", "trent@example.com"];
    let (_, other_tree) = build_tree(&outsiders).unwrap();
    let mallory = VoterCredential::from_secret(outsiders[0], [99u8; SECRET_LENGTH]);
    let election = h.registry.get_election(id).unwrap();
    let submission = prepare_ballot(
        &SchnorrProofSystem,
        &election,
        &mallory,
        0,
        &other_tree.prove_membership(0).unwrap(),
    )
    .unwrap();

    assert!(matches!(
        h.registry.cast_vote(id, submission),
        Err(Error::VoterNotEligible)
    ));
    assert_eq!(h.registry.ballot_count(id).unwrap(), 0);
}

#[test]
fn votes_outside_the_window_are_rejected() {
    let h = harness();
    let id = h
        .registry
        .create_election(&h.manager, h.params(false))
        .unwrap();

    // Still in setup
    h.clock.set(T0 + 10);
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 0, 0)),
        Err(Error::ElectionNotActive)
    ));

    h.registry.activate(&h.manager, id).unwrap();

    // Too early
    h.clock.set(T0 - 1);
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 0, 0)),
        Err(Error::ElectionNotActive)
    ));

    // Boundaries are inclusive
    h.clock.set(T0);
    h.registry.cast_vote(id, h.submission(id, 0, 0)).unwrap();
    h.clock.set(T0 + 3600);
    h.registry.cast_vote(id, h.submission(id, 1, 0)).unwrap();

    // Too late: the election is ended on the spot
    h.clock.set(T0 + 3601);
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 2, 0)),
        Err(Error::ElectionNotActive)
    ));
    assert_eq!(
        h.registry.get_election(id).unwrap().state,
        ElectionState::Ended
    );
    assert_eq!(h.registry.ballot_count(id).unwrap(), 2);
}

#[test]
fn proof_for_another_election_is_rejected() {
    let h = harness();
    let first = h.open_election(false);
    let second = h
        .registry
        .create_election(&h.manager, h.params(false))
        .unwrap();
    h.registry.activate(&h.manager, second).unwrap();

    assert!(matches!(
        h.registry.cast_vote(second, h.submission(first, 1, 0)),
        Err(Error::ElectionMismatch)
    ));

    // Outer fields must repeat the proof's
    let mut tampered = h.submission(second, 1, 0);
    tampered.commitment = h.credentials[1].commitment(1);
    assert!(matches!(
        h.registry.cast_vote(second, tampered),
        Err(Error::InvalidZKProof)
    ));

    assert!(matches!(
        h.registry.cast_vote(ElectionId(77), h.submission(first, 1, 0)),
        Err(Error::InvalidElectionId)
    ));
}

#[test]
fn finished_elections_never_reopen() {
    let h = harness();
    let id = h.open_election(false);
    h.registry.cast_vote(id, h.submission(id, 0, 1)).unwrap();
    h.close_and_tally(id);

    assert!(matches!(
        h.registry.activate(&h.manager, id),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        h.registry.pause(&h.admin, id, "late problem"),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        h.registry.resume(&h.admin, id),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        h.registry.tally(&h.manager, id, &h.election_secret),
        Err(Error::InvalidStateTransition { .. })
    ));
    h.clock.set(T0 + 100);
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 1, 1)),
        Err(Error::ElectionNotActive)
    ));

    h.registry.audit(&h.auditor, id, [1u8; 32], true).unwrap();
    assert!(matches!(
        h.registry.activate(&h.manager, id),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        h.registry.audit(&h.auditor, id, [1u8; 32], true),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert_eq!(
        h.registry.get_election(id).unwrap().state,
        ElectionState::Audited
    );
}

#[test]
fn audit_gates_results() {
    let h = harness();
    let id = h.open_election(true);
    h.registry.cast_vote(id, h.submission(id, 1, 0)).unwrap();

    // Audit before tally
    assert!(matches!(
        h.registry.audit(&h.auditor, id, [0u8; 32], true),
        Err(Error::ElectionNotEnded)
    ));

    h.close_and_tally(id);
    assert!(matches!(h.registry.get_results(id), Err(Error::AuditRequired)));

    assert!(matches!(
        h.registry.audit(&h.manager, id, [7u8; 32], true),
        Err(Error::UnauthorizedAccess(_, Role::Auditor))
    ));

    let record = h.registry.audit(&h.auditor, id, [7u8; 32], false).unwrap();
    assert_eq!(record.auditor, h.auditor);

    let results = h.registry.get_results(id).unwrap();
    assert_eq!(results.audit, Some(record));
    assert_eq!(results.pairs(), vec![("A".into(), 1), ("B".into(), 0)]);
}

#[test]
fn emergency_pause() {
    let h = harness();
    let id = h.open_election(false);

    assert!(matches!(
        h.registry.pause(&h.admin, id, "  "),
        Err(Error::PauseReasonRequired)
    ));
    assert!(matches!(
        h.registry.pause(&h.manager, id, "suspicious traffic"),
        Err(Error::UnauthorizedAccess(_, Role::Admin))
    ));

    h.registry.pause(&h.admin, id, "suspicious traffic").unwrap();
    assert!(matches!(
        h.registry.cast_vote(id, h.submission(id, 0, 0)),
        Err(Error::ElectionNotActive)
    ));
    assert!(matches!(
        h.registry.end_voting(id),
        Err(Error::InvalidStateTransition { .. })
    ));

    assert_eq!(
        h.registry.resume(&h.admin, id).unwrap(),
        ElectionState::Active
    );
    h.registry.cast_vote(id, h.submission(id, 0, 0)).unwrap();

    assert!(h.events.events().contains(&Event::EmergencyPause {
        election_id: id,
        by: h.admin.clone(),
        reason: "suspicious traffic".into(),
    }));
}

#[test]
fn open_feature_set() {
    let h = harness_with(FeatureSet::open());
    let anyone = Principal::from("anyone");

    let id = h.registry.create_election(&anyone, h.params(false)).unwrap();
    h.registry.activate(&anyone, id).unwrap();
    assert!(matches!(
        h.registry.pause(&h.admin, id, "stop"),
        Err(Error::FeatureDisabled(_))
    ));
}

#[test]
fn role_checks() {
    let h = harness();
    let nobody = Principal::from("nobody");
    assert!(matches!(
        h.registry.create_election(&nobody, h.params(false)),
        Err(Error::UnauthorizedAccess(_, Role::ElectionManager))
    ));

    let id = h.open_election(false);
    h.clock.set(T0 + 3601);
    assert!(matches!(
        h.registry.tally(&nobody, id, &h.election_secret),
        Err(Error::UnauthorizedAccess(_, Role::ElectionManager))
    ));
}

#[test]
fn setup_and_queries() {
    let h = harness();
    let id = h
        .registry
        .create_election(&h.manager, h.params(false))
        .unwrap();

    h.registry
        .set_candidates(&h.manager, id, vec!["X".into(), "Y".into(), "Z".into()])
        .unwrap();
    assert!(matches!(
        h.registry.set_candidates(&h.manager, id, vec!["X".into()]),
        Err(Error::TooManyCandidates(50, 1))
    ));
    h.registry.activate(&h.manager, id).unwrap();
    assert!(matches!(
        h.registry.set_candidates(&h.manager, id, vec!["X".into(), "Y".into()]),
        Err(Error::CandidatesLocked)
    ));
    assert_eq!(h.registry.get_election(id).unwrap().candidates.len(), 3);

    let mut other = h.params(false);
    other.organization = "globex".into();
    h.registry.create_election(&h.manager, other).unwrap();

    assert_eq!(h.registry.list_elections(None).unwrap().len(), 2);
    let acme = h.registry.list_elections(Some("acme")).unwrap();
    assert_eq!(acme.len(), 1);
    assert_eq!(acme[0].id, id);
    assert!(h.registry.list_elections(Some("initech")).unwrap().is_empty());

    h.clock.set(T0 + 600);
    assert_eq!(h.registry.time_remaining(id).unwrap(), 3000);
    assert!(matches!(
        h.registry.get_election(ElectionId(99)),
        Err(Error::InvalidElectionId)
    ));

    // Rejected creations do not consume ids
    let mut bad = h.params(false);
    bad.end_time = bad.start_time;
    assert!(h.registry.create_election(&h.manager, bad).is_err());
    let next = h
        .registry
        .create_election(&h.manager, h.params(false))
        .unwrap();
    assert_eq!(next, ElectionId(3));
}

#[test]
fn tally_gates() {
    let h = harness();
    let id = h.open_election(false);
    h.registry.cast_vote(id, h.submission(id, 0, 1)).unwrap();

    assert!(matches!(
        h.registry.tally(&h.manager, id, &h.election_secret),
        Err(Error::ElectionNotEnded)
    ));
    assert!(matches!(
        h.registry.end_voting(id),
        Err(Error::ElectionNotEnded)
    ));

    // Past the end the tally ends the election itself
    h.clock.set(T0 + 4000);
    let (wrong_secret, _) = generate_keypair();
    assert!(matches!(
        h.registry.tally(&h.manager, id, &wrong_secret),
        Err(Error::InvalidKey)
    ));
    let result = h
        .registry
        .tally(&h.manager, id, &h.election_secret)
        .unwrap();
    assert_eq!(result.pairs(), vec![("A".into(), 0), ("B".into(), 1)]);
}

#[test]
fn refused_tally_leaves_the_election_untouched() {
    let h = harness();
    let id = h.open_election(false);
    h.registry.cast_vote(id, h.submission(id, 2, 0)).unwrap();
    h.clock.set(T0 + 4000);

    let ended = |events: &[Event]| {
        events
            .iter()
            .filter(|event| {
                matches!(event, Event::StateChanged { election_id, to: ElectionState::Ended, .. } if *election_id == id)
            })
            .count()
    };

    let (wrong_secret, _) = generate_keypair();
    for _ in 0..2 {
        assert!(matches!(
            h.registry.tally(&h.manager, id, &wrong_secret),
            Err(Error::InvalidKey)
        ));
        assert_eq!(ended(&h.events.events()), 0);
        assert_eq!(
            h.registry.get_election(id).unwrap().state,
            ElectionState::Active
        );
    }

    h.registry
        .tally(&h.manager, id, &h.election_secret)
        .unwrap();
    assert_eq!(ended(&h.events.events()), 1);
    assert_eq!(
        h.registry.get_election(id).unwrap().state,
        ElectionState::Tallied
    );
}

#[test]
fn swapped_ciphertext_is_rejected() {
    let h = harness();
    let id = h.open_election(false);

    // A relayer re-encrypts another choice under the voter's proof
    let mut submission = h.submission(id, 0, 0);
    submission.encrypted_vote = encrypt_vote(&h.election_public, 1).unwrap();
    assert!(matches!(
        h.registry.cast_vote(id, submission),
        Err(Error::InvalidZKProof)
    ));
    assert_eq!(h.registry.ballot_count(id).unwrap(), 0);

    // Rebinding the signals to the new ciphertext breaks the proof instead
    let mut submission = h.submission(id, 0, 0);
    submission.encrypted_vote = encrypt_vote(&h.election_public, 1).unwrap();
    submission.proof.public_signals.ballot_hash = ballot_hash(&submission.encrypted_vote);
    assert!(matches!(
        h.registry.cast_vote(id, submission),
        Err(Error::InvalidZKProof)
    ));
    assert_eq!(h.registry.ballot_count(id).unwrap(), 0);
    assert!(!h.registry.has_voted(id, &h.credentials[0].nullifier).unwrap());

    h.registry.cast_vote(id, h.submission(id, 0, 0)).unwrap();
    let tally = h.close_and_tally(id);
    assert_eq!(tally.pairs(), vec![("A".into(), 1), ("B".into(), 0)]);
}

#[test]
fn tally_conserves_ballots() {
    let h = harness();
    let id = h.open_election(false);
    for (voter, candidate) in vec![(0, 1), (1, 0), (2, 1)] {
        h.registry
            .cast_vote(id, h.submission(id, voter, candidate))
            .unwrap();
    }

    let tally = h.close_and_tally(id);
    let sum: u64 = tally.totals.iter().map(|t| t.votes).sum();
    assert_eq!(sum, h.registry.ballot_count(id).unwrap());
    assert_eq!(tally.counted + tally.rejected, 3);
    assert_eq!(tally.pairs(), vec![("A".into(), 1), ("B".into(), 2)]);
}

#[test]
fn concurrent_double_vote() {
    let h = harness();
    let id = h.open_election(false);
    let submission = h.submission(id, 1, 0);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = h.registry.clone();
            let submission = submission.clone();
            thread::spawn(move || registry.cast_vote(id, submission))
        })
        .collect();

    let outcomes: Vec<Result<Receipt, Error>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|o| o.as_ref().err())
        .all(|e| matches!(e, Error::AlreadyVoted)));
    assert_eq!(h.registry.ballot_count(id).unwrap(), 1);
}

#[test]
fn batch_verification_against_an_election() {
    let h = harness();
    let id = h.open_election(false);
    let proofs = vec![
        h.submission(id, 0, 0).proof,
        h.submission(id, 1, 1).proof,
        h.submission(id, 0, 1).proof,
    ];

    let batch = batch_verify(
        &SchnorrProofSystem,
        proofs,
        &h.tree.root(),
        id,
        Default::default(),
    );
    assert_eq!(batch.valid_proofs.len(), 2);
    assert_eq!(batch.invalid_proofs.len(), 1);
    assert_eq!(batch.invalid_proofs[0].1, vec![ProofError::AlreadyVoted]);
}
