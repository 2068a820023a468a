use crate::*;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tallystick::plurality::DefaultPluralityTally;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate_index: u32,
    pub candidate: String,
    pub votes: u64,

    /// Share of counted ballots, rounded to two decimal places
    pub percentage: Decimal,
}

/// Public outcome of an election.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    pub election_id: ElectionId,

    /// One entry per candidate, in candidate order
    pub totals: Vec<CandidateTally>,

    /// Ballots that contributed to `totals`
    pub counted: u64,

    /// Ballots excluded at tally time: repeated nullifiers, undecryptable
    /// payloads or choices outside the candidate list
    pub rejected: u64,

    /// Candidates with the most votes. Several on a tie, none if nothing was counted.
    pub winners: Vec<String>,

    pub tallied_at: u64,
}

impl TallyResult {
    /// `(candidate, votes)` pairs in candidate order
    pub fn pairs(&self) -> Vec<(String, u64)> {
        self.totals
            .iter()
            .map(|t| (t.candidate.clone(), t.votes))
            .collect()
    }

    /// Every ballot fed into the tally, counted or not.
    pub fn ballots_processed(&self) -> u64 {
        self.counted + self.rejected
    }
}

/// Decrypt and count recorded ballots.
///
/// Each ballot is processed once and the result does not depend on ballot
/// order. `counted + rejected` always equals `ballots.len()`.
pub fn tally(
    election: &Election,
    ballots: &[Ballot],
    election_secret: &ElectionSecretKey,
    now: u64,
) -> TallyResult {
    let num_candidates = election.num_candidates();
    let mut plurality = DefaultPluralityTally::new(1);
    let mut seen = BTreeSet::new();
    let mut counted = 0u64;
    let mut rejected = 0u64;

    for ballot in ballots {
        if !seen.insert(&ballot.nullifier_hash) {
            warn!("election {}: duplicate nullifier excluded from tally", election.id);
            rejected += 1;
            continue;
        }
        match decrypt_vote(election_secret, &ballot.encrypted_vote) {
            Ok(choice) if choice < num_candidates => {
                plurality.add(choice);
                counted += 1;
            }
            Ok(_) => {
                warn!("election {}: out-of-range choice excluded from tally", election.id);
                rejected += 1;
            }
            Err(_) => {
                warn!("election {}: undecryptable ballot excluded from tally", election.id);
                rejected += 1;
            }
        }
    }

    let mut votes = vec![0u64; num_candidates as usize];
    for (choice, total) in plurality.totals() {
        votes[choice as usize] = total;
    }

    let totals = election
        .candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| CandidateTally {
            candidate_index: index as u32,
            candidate: candidate.clone(),
            votes: votes[index],
            percentage: percentage(votes[index], counted),
        })
        .collect();

    let winners = if counted == 0 {
        vec![]
    } else {
        let mut winning: Vec<u32> = plurality.winners().into_unranked();
        winning.sort_unstable();
        winning
            .into_iter()
            .map(|index| election.candidates[index as usize].clone())
            .collect()
    };

    info!(
        "election {}: tallied {} ballot(s), {} excluded",
        election.id, counted, rejected
    );

    TallyResult {
        election_id: election.id,
        totals,
        counted,
        rejected,
        winners,
        tallied_at: now,
    }
}

fn percentage(votes: u64, counted: u64) -> Decimal {
    if counted == 0 {
        return Decimal::new(0, 0);
    }
    (Decimal::from(votes) * Decimal::from(100u64) / Decimal::from(counted)).round_dp(2)
}
