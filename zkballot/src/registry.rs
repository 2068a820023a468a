//! The election registry: the authoritative state machine for every election.
//!
//! All state-mutating operations on one election run under that election's
//! lock and read the clock exactly once, so the window check and the ballot
//! write can never disagree. Reads take no lock.

use crate::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Published results, with the audit record when there is one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ElectionResults {
    pub tally: TallyResult,
    pub audit: Option<AuditRecord>,
}

impl ElectionResults {
    /// `(candidate, votes)` pairs in candidate order
    pub fn pairs(&self) -> Vec<(String, u64)> {
        self.tally.pairs()
    }
}

/// The election state machine over a [`Store`].
///
/// Each mutating call authorizes the caller, then holds a per-election lock
/// while it reads, checks and writes.
///
/// Vote eligibility is only as strong as the [`ProofSystem`]. The default
/// [`SchnorrProofSystem`] binds a proof to its public signals but cannot show
/// that the prover is in the eligibility tree: anyone who knows the root can
/// mint a valid proof under a fresh nullifier with a client that skips the
/// witness checks. Deployments that need eligibility enforced against
/// dishonest clients must install a circuit backend with
/// [`Registry::with_proof_system`].
pub struct Registry<S: Store> {
    store: S,
    config: ProtocolConfig,
    features: FeatureSet,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    proofs: Arc<dyn ProofSystem>,
    locks: Mutex<HashMap<ElectionId, Arc<Mutex<()>>>>,
}

impl<S: Store> Registry<S> {
    /// A registry with default limits, governed features, an empty role table,
    /// the system clock, log-backed events and the Schnorr proof backend.
    pub fn new(store: S) -> Self {
        Registry {
            store,
            config: ProtocolConfig::default(),
            features: FeatureSet::governed(),
            authorizer: Arc::new(RoleTable::new()),
            clock: Arc::new(SystemClock),
            events: Arc::new(LogEventSink),
            proofs: Arc::new(SchnorrProofSystem),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_features(mut self, features: FeatureSet) -> Self {
        self.features = features;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_proof_system(mut self, proofs: Arc<dyn ProofSystem>) -> Self {
        self.proofs = proofs;
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    pub fn proof_system(&self) -> &dyn ProofSystem {
        &*self.proofs
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create an election in `Setup`. Requires `ElectionManager`.
    pub fn create_election(
        &self,
        caller: &Principal,
        params: ElectionParams,
    ) -> Result<ElectionId, Error> {
        self.authorize(caller, Role::ElectionManager)?;
        let now = self.clock.now();

        // Validate before taking an id so rejected requests leave no gap
        params.validate(now, &self.config)?;
        let id = self.store.next_election_id()?;
        let election = Election::new(id, params, caller.clone(), now, &self.config)?;
        let organization = election.organization.clone();
        self.store.put_election(election)?;

        info!("election {} created by {} for {}", id, caller, organization);
        self.events.emit(Event::ElectionCreated {
            election_id: id,
            creator: caller.clone(),
            organization,
        });
        Ok(id)
    }

    /// Replace the candidate list. Only possible during `Setup`.
    pub fn set_candidates(
        &self,
        caller: &Principal,
        id: ElectionId,
        candidates: Vec<String>,
    ) -> Result<(), Error> {
        self.authorize(caller, Role::ElectionManager)?;
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        if election.state != ElectionState::Setup {
            return Err(Error::CandidatesLocked);
        }
        validate_candidates(&candidates, &self.config)?;

        let count = candidates.len();
        election.candidates = candidates;
        self.store.put_election(election)?;

        info!("election {}: candidate list set to {} entries", id, count);
        self.events.emit(Event::CandidatesUpdated {
            election_id: id,
            count,
        });
        Ok(())
    }

    /// `Setup -> Active`. Requires `ElectionManager`.
    pub fn activate(&self, caller: &Principal, id: ElectionId) -> Result<(), Error> {
        self.authorize(caller, Role::ElectionManager)?;
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        validate_candidates(&election.candidates, &self.config)?;
        self.transition(&mut election, ElectionState::Active)?;
        self.store.put_election(election)
    }

    /// Emergency pause from `Setup`, `Active` or `Ended`. Requires `Admin` and
    /// a non-empty reason, which is recorded in the event log.
    pub fn pause(&self, caller: &Principal, id: ElectionId, reason: &str) -> Result<(), Error> {
        if !self.features.pausable {
            return Err(Error::FeatureDisabled("pause"));
        }
        self.authorize(caller, Role::Admin)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::PauseReasonRequired);
        }

        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        let from = election.state;
        if !from.pausable() {
            return Err(Error::InvalidStateTransition {
                from,
                to: ElectionState::Paused,
            });
        }
        election.paused_from = Some(from);
        election.state = ElectionState::Paused;
        self.store.put_election(election)?;

        warn!("election {} paused by {}: {}", id, caller, reason);
        self.events.emit(Event::EmergencyPause {
            election_id: id,
            by: caller.clone(),
            reason: reason.to_string(),
        });
        self.events.emit(Event::StateChanged {
            election_id: id,
            from,
            to: ElectionState::Paused,
        });
        Ok(())
    }

    /// Leave `Paused`, returning to the state the pause was entered from.
    pub fn resume(&self, caller: &Principal, id: ElectionId) -> Result<ElectionState, Error> {
        if !self.features.pausable {
            return Err(Error::FeatureDisabled("pause"));
        }
        self.authorize(caller, Role::Admin)?;
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        if election.state != ElectionState::Paused {
            return Err(Error::InvalidStateTransition {
                from: election.state,
                to: ElectionState::Active,
            });
        }
        let to = election
            .paused_from
            .take()
            .ok_or_else(|| Error::Storage(format!("paused election {} has no prior state", id)))?;
        election.state = to;
        self.store.put_election(election)?;

        info!("election {} resumed by {} into {}", id, caller, to);
        self.events.emit(Event::Resumed {
            election_id: id,
            by: caller.clone(),
            to,
        });
        self.events.emit(Event::StateChanged {
            election_id: id,
            from: ElectionState::Paused,
            to,
        });
        Ok(to)
    }

    /// `Active -> Ended` once the window has closed. Anyone may call this.
    pub fn end_voting(&self, id: ElectionId) -> Result<(), Error> {
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        if election.state != ElectionState::Active {
            return Err(Error::InvalidStateTransition {
                from: election.state,
                to: ElectionState::Ended,
            });
        }
        if !election.has_expired(self.clock.now()) {
            return Err(Error::ElectionNotEnded);
        }
        self.transition(&mut election, ElectionState::Ended)?;
        self.store.put_election(election)
    }

    /// Record a ballot.
    ///
    /// Rejections, in order: unknown election, closed election or window,
    /// then the proof-layer findings (already voted, not eligible, election
    /// mismatch, invalid proof), then a submission whose fields or encrypted
    /// vote differ from what the proof covers.
    ///
    /// With the default [`SchnorrProofSystem`] a proof rooted at the right tree
    /// is accepted without the registry seeing the membership path, so a
    /// modified client can vote under a made-up credential. See [`Registry`].
    pub fn cast_vote(
        &self,
        id: ElectionId,
        submission: BallotSubmission,
    ) -> Result<Receipt, Error> {
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        let now = self.clock.now();

        if election.state == ElectionState::Active && election.has_expired(now) {
            self.transition(&mut election, ElectionState::Ended)?;
            self.store.put_election(election)?;
            return Err(Error::ElectionNotActive);
        }
        if !election.is_open_at(now) {
            debug!("election {}: vote rejected, state {} at {}", id, election.state, now);
            return Err(Error::ElectionNotActive);
        }

        // Only the submitted nullifier matters for the double-vote check
        let mut used = BTreeSet::new();
        if self.store.is_nullifier_used(id, &submission.nullifier_hash)? {
            used.insert(submission.nullifier_hash.clone());
        }

        let verification = verify_vote_proof(
            &*self.proofs,
            &submission.proof,
            &election.eligibility_root,
            id,
            &used,
        );
        if !verification.valid {
            warn!("election {}: vote rejected: {:?}", id, verification.errors);
        }
        verification.into_result()?;
        if !submission.is_consistent() {
            warn!("election {}: submission disagrees with its proof", id);
            return Err(Error::InvalidZKProof);
        }

        let nullifier = submission.nullifier_hash.clone();
        let ballot = Ballot::from_submission(submission, now);
        let ballot_index = self
            .store
            .insert_ballot(id, ballot)?
            .ok_or(Error::AlreadyVoted)?;

        info!("election {}: ballot {} recorded", id, ballot_index);
        self.events.emit(Event::VoteCast {
            election_id: id,
            nullifier: nullifier.clone(),
            timestamp: now,
        });

        Ok(Receipt {
            election_id: id,
            nullifier_hash: nullifier,
            ballot_index,
            timestamp: now,
        })
    }

    /// `Ended -> Tallied`: decrypt and count every recorded ballot.
    /// Requires `ElectionManager` and the election's secret key.
    pub fn tally(
        &self,
        caller: &Principal,
        id: ElectionId,
        election_secret: &ElectionSecretKey,
    ) -> Result<TallyResult, Error> {
        self.authorize(caller, Role::ElectionManager)?;
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        let now = self.clock.now();

        // Every check runs before the lazy end, so a refused tally changes nothing
        let ends_now = election.state == ElectionState::Active && election.has_expired(now);
        match election.state {
            ElectionState::Ended => {}
            ElectionState::Active if ends_now => {}
            ElectionState::Tallied | ElectionState::Audited => {
                return Err(Error::InvalidStateTransition {
                    from: election.state,
                    to: ElectionState::Tallied,
                })
            }
            _ => return Err(Error::ElectionNotEnded),
        }
        if ElectionPublicKey::from_secret(election_secret) != election.encryption_key {
            warn!("election {}: tally refused, key does not match", id);
            return Err(Error::InvalidKey);
        }
        if ends_now {
            self.transition(&mut election, ElectionState::Ended)?;
            self.store.put_election(election.clone())?;
        }

        let ballots = self.store.ballots(id)?;
        let result = tally(&election, &ballots, election_secret, now);
        self.store.put_tally(result.clone())?;

        self.transition(&mut election, ElectionState::Tallied)?;
        self.store.put_election(election)?;

        self.events.emit(Event::Tallied {
            election_id: id,
            counted: result.counted,
            rejected: result.rejected,
        });
        Ok(result)
    }

    /// `Tallied -> Audited`. Requires `Auditor`.
    pub fn audit(
        &self,
        caller: &Principal,
        id: ElectionId,
        audit_hash: [u8; 32],
        passed: bool,
    ) -> Result<AuditRecord, Error> {
        self.authorize(caller, Role::Auditor)?;
        let lock = self.election_lock(id)?;
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut election = self.load(id)?;
        match election.state {
            ElectionState::Tallied => {}
            ElectionState::Audited => {
                return Err(Error::InvalidStateTransition {
                    from: ElectionState::Audited,
                    to: ElectionState::Audited,
                })
            }
            _ => return Err(Error::ElectionNotEnded),
        }

        let record = AuditRecord {
            audit_hash,
            passed,
            auditor: caller.clone(),
            timestamp: self.clock.now(),
        };
        election.audit = Some(record.clone());
        self.transition(&mut election, ElectionState::Audited)?;
        self.store.put_election(election)?;

        if passed {
            info!("election {} audit passed", id);
        } else {
            warn!("election {} audit failed", id);
        }
        self.events.emit(Event::Audited {
            election_id: id,
            audit_hash,
            passed,
        });
        Ok(record)
    }

    /// Results of a `Tallied` election, or of an `Audited` one when the
    /// election requires an audit.
    pub fn get_results(&self, id: ElectionId) -> Result<ElectionResults, Error> {
        let election = self.load(id)?;
        match election.state {
            ElectionState::Audited => {}
            ElectionState::Tallied if !election.requires_audit => {}
            ElectionState::Tallied => return Err(Error::AuditRequired),
            _ => return Err(Error::ElectionNotEnded),
        }
        let tally = self
            .store
            .get_tally(id)?
            .ok_or_else(|| Error::Storage(format!("tally for election {} is missing", id)))?;
        Ok(ElectionResults {
            tally,
            audit: election.audit,
        })
    }

    pub fn get_election(&self, id: ElectionId) -> Result<Election, Error> {
        self.load(id)
    }

    /// All elections, or those of one organization.
    pub fn list_elections(&self, organization: Option<&str>) -> Result<Vec<Election>, Error> {
        let elections = self.store.elections()?;
        Ok(match organization {
            Some(org) => elections
                .into_iter()
                .filter(|e| e.organization == org)
                .collect(),
            None => elections,
        })
    }

    pub fn has_voted(&self, id: ElectionId, nullifier: &FieldElement) -> Result<bool, Error> {
        self.load(id)?;
        self.store.is_nullifier_used(id, nullifier)
    }

    pub fn ballot_count(&self, id: ElectionId) -> Result<u64, Error> {
        self.load(id)?;
        self.store.ballot_count(id)
    }

    /// Seconds until voting closes.
    pub fn time_remaining(&self, id: ElectionId) -> Result<u64, Error> {
        Ok(self.load(id)?.time_remaining(self.clock.now()))
    }

    fn authorize(&self, caller: &Principal, role: Role) -> Result<(), Error> {
        if !self.features.role_gating {
            return Ok(());
        }
        self.authorizer.require(caller, role).map_err(|e| {
            warn!("{} denied: needs {}", caller, role);
            e
        })
    }

    fn load(&self, id: ElectionId) -> Result<Election, Error> {
        self.store
            .get_election(id)?
            .ok_or(Error::InvalidElectionId)
    }

    /// Lock for an existing election. Unknown ids get no entry.
    fn election_lock(&self, id: ElectionId) -> Result<Arc<Mutex<()>>, Error> {
        self.load(id)?;
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Storage("election lock table poisoned".into()))?;
        Ok(locks.entry(id).or_default().clone())
    }

    fn transition(&self, election: &mut Election, to: ElectionState) -> Result<(), Error> {
        let from = election.state;
        election.state = from.advance_to(to)?;
        info!("election {}: {} -> {}", election.id, from, to);
        self.events.emit(Event::StateChanged {
            election_id: election.id,
            from,
            to,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (Registry<MemStore>, Principal, ElectionPublicKey) {
        let roles = Arc::new(RoleTable::new());
        roles.grant("mgr", Role::ElectionManager);
        roles.grant("mgr", Role::Admin);
        roles.grant("mgr", Role::Auditor);
        let (_, public) = generate_keypair();
        let registry = Registry::new(MemStore::new())
            .with_clock(Arc::new(ManualClock::new(1_000)))
            .with_events(Arc::new(MemEventLog::new()))
            .with_authorizer(roles);
        (registry, "mgr".into(), public)
    }

    fn lock_count<S: Store>(registry: &Registry<S>) -> usize {
        registry.locks.lock().unwrap().len()
    }

    #[test]
    fn unknown_elections_take_no_lock() {
        let (registry, mgr, public) = registry();
        let (secret, _) = generate_keypair();
        let (_, tree) = build_tree(vec!["v"]).unwrap();

        let id = registry
            .create_election(
                &mgr,
                ElectionParams {
                    title: "Budget".into(),
                    candidates: vec!["yes".into(), "no".into()],
                    start_time: 1_000,
                    end_time: 1_000 + 3600,
                    eligibility_root: tree.root(),
                    encryption_key: public,
                    organization: "city".into(),
                    requires_audit: false,
                },
            )
            .unwrap();
        assert_eq!(lock_count(&registry), 0);

        let election = registry.get_election(id).unwrap();
        let credential = VoterCredential::from_secret("v", [3u8; SECRET_LENGTH]);
        let submission = prepare_ballot(
            &SchnorrProofSystem,
            &election,
            &credential,
            0,
            &tree.prove_membership(0).unwrap(),
        )
        .unwrap();

        for n in 100..150 {
            let unknown = ElectionId(n);
            assert!(matches!(registry.activate(&mgr, unknown), Err(Error::InvalidElectionId)));
            assert!(matches!(
                registry.set_candidates(&mgr, unknown, vec!["a".into(), "b".into()]),
                Err(Error::InvalidElectionId)
            ));
            assert!(matches!(registry.pause(&mgr, unknown, "fire"), Err(Error::InvalidElectionId)));
            assert!(matches!(registry.resume(&mgr, unknown), Err(Error::InvalidElectionId)));
            assert!(matches!(registry.end_voting(unknown), Err(Error::InvalidElectionId)));
            assert!(matches!(
                registry.cast_vote(unknown, submission.clone()),
                Err(Error::InvalidElectionId)
            ));
            assert!(matches!(
                registry.tally(&mgr, unknown, &secret),
                Err(Error::InvalidElectionId)
            ));
            assert!(matches!(
                registry.audit(&mgr, unknown, [0u8; 32], true),
                Err(Error::InvalidElectionId)
            ));
        }
        assert_eq!(lock_count(&registry), 0);

        registry.activate(&mgr, id).unwrap();
        registry.cast_vote(id, submission).unwrap();
        assert_eq!(lock_count(&registry), 1);
    }
}
