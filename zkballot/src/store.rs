use crate::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Persistence used by the registry.
///
/// Failures talking to the backing store are reported as `Error::Storage` so
/// callers can tell them apart from business-rule rejections.
pub trait Store: Send + Sync {
    /// Hand out the next election id. Ids are never reused.
    fn next_election_id(&self) -> Result<ElectionId, Error>;

    fn get_election(&self, id: ElectionId) -> Result<Option<Election>, Error>;

    fn put_election(&self, election: Election) -> Result<(), Error>;

    fn elections(&self) -> Result<Vec<Election>, Error>;

    /// Append a ballot unless its nullifier is already recorded for the
    /// election. The check and the insert are atomic. Returns the index of the
    /// new ballot, or `None` if the nullifier was taken.
    fn insert_ballot(&self, id: ElectionId, ballot: Ballot) -> Result<Option<u64>, Error>;

    fn ballots(&self, id: ElectionId) -> Result<Vec<Ballot>, Error>;

    fn ballot_count(&self, id: ElectionId) -> Result<u64, Error> {
        Ok(self.ballots(id)?.len() as u64)
    }

    fn is_nullifier_used(&self, id: ElectionId, nullifier: &FieldElement) -> Result<bool, Error>;

    fn used_nullifiers(&self, id: ElectionId) -> Result<BTreeSet<FieldElement>, Error> {
        Ok(self
            .ballots(id)?
            .into_iter()
            .map(|ballot| ballot.nullifier_hash)
            .collect())
    }

    fn put_tally(&self, tally: TallyResult) -> Result<(), Error>;

    fn get_tally(&self, id: ElectionId) -> Result<Option<TallyResult>, Error>;
}

#[derive(Default)]
struct MemStoreInner {
    last_id: u64,
    elections: BTreeMap<ElectionId, Election>,
    ballots: HashMap<ElectionId, Vec<Ballot>>,
    nullifiers: HashMap<ElectionId, BTreeSet<FieldElement>>,
    tallies: HashMap<ElectionId, TallyResult>,
}

/// A simple store that keeps everything in memory
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<MemStoreInner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<MemStoreInner>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<MemStoreInner>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

impl Store for MemStore {
    fn next_election_id(&self) -> Result<ElectionId, Error> {
        let mut inner = self.write()?;
        inner.last_id += 1;
        Ok(ElectionId(inner.last_id))
    }

    fn get_election(&self, id: ElectionId) -> Result<Option<Election>, Error> {
        Ok(self.read()?.elections.get(&id).cloned())
    }

    fn put_election(&self, election: Election) -> Result<(), Error> {
        self.write()?.elections.insert(election.id, election);
        Ok(())
    }

    fn elections(&self) -> Result<Vec<Election>, Error> {
        Ok(self.read()?.elections.values().cloned().collect())
    }

    fn insert_ballot(&self, id: ElectionId, ballot: Ballot) -> Result<Option<u64>, Error> {
        let mut inner = self.write()?;
        if !inner
            .nullifiers
            .entry(id)
            .or_default()
            .insert(ballot.nullifier_hash.clone())
        {
            return Ok(None);
        }
        let ballots = inner.ballots.entry(id).or_default();
        ballots.push(ballot);
        Ok(Some(ballots.len() as u64 - 1))
    }

    fn ballots(&self, id: ElectionId) -> Result<Vec<Ballot>, Error> {
        Ok(self.read()?.ballots.get(&id).cloned().unwrap_or_default())
    }

    fn ballot_count(&self, id: ElectionId) -> Result<u64, Error> {
        Ok(self
            .read()?
            .ballots
            .get(&id)
            .map(|ballots| ballots.len() as u64)
            .unwrap_or(0))
    }

    fn is_nullifier_used(&self, id: ElectionId, nullifier: &FieldElement) -> Result<bool, Error> {
        Ok(self
            .read()?
            .nullifiers
            .get(&id)
            .map(|used| used.contains(nullifier))
            .unwrap_or(false))
    }

    fn used_nullifiers(&self, id: ElectionId) -> Result<BTreeSet<FieldElement>, Error> {
        Ok(self.read()?.nullifiers.get(&id).cloned().unwrap_or_default())
    }

    fn put_tally(&self, tally: TallyResult) -> Result<(), Error> {
        self.write()?.tallies.insert(tally.election_id, tally);
        Ok(())
    }

    fn get_tally(&self, id: ElectionId) -> Result<Option<TallyResult>, Error> {
        Ok(self.read()?.tallies.get(&id).cloned())
    }
}
