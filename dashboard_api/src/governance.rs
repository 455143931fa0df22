//! Governance proposals and delegates

use crate::units::bn_to_number;
use crate::upstream::{DelegateEvent, RawProposal};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Governance token decimals
const VOTE_DECIMALS: u32 = 18;

/// Proposals shown in the "recent" list
pub const RECENT_PROPOSALS: usize = 10;

/// GovernorAlpha proposal state, in `state()` ordinal order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

impl ProposalStatus {
    pub fn from_ordinal(state: u8) -> Option<Self> {
        use ProposalStatus::*;
        [Pending, Active, Canceled, Defeated, Succeeded, Queued, Expired, Executed]
            .get(state as usize)
            .copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Active => "active",
            ProposalStatus::Canceled => "canceled",
            ProposalStatus::Defeated => "defeated",
            ProposalStatus::Succeeded => "succeeded",
            ProposalStatus::Queued => "queued",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Executed => "executed",
        }
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (0u8..8)
            .filter_map(ProposalStatus::from_ordinal)
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown proposal status {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub proposal_num: u64,
    pub proposer: String,
    pub status: ProposalStatus,
    pub for_votes: f64,
    pub against_votes: f64,
    pub start_block: u64,
    pub end_block: u64,
    pub eta: u64,
}

impl Proposal {
    /// `None` for a state ordinal the governor should never return
    pub fn from_raw(raw: &RawProposal) -> Option<Self> {
        Some(Self {
            proposal_num: raw.id,
            proposer: format!("{:?}", raw.proposer),
            status: ProposalStatus::from_ordinal(raw.state)?,
            for_votes: bn_to_number(raw.for_votes, VOTE_DECIMALS),
            against_votes: bn_to_number(raw.against_votes, VOTE_DECIMALS),
            start_block: raw.start_block,
            end_block: raw.end_block,
            eta: raw.eta,
        })
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.proposer.to_lowercase().contains(&query)
            || self.proposal_num.to_string() == query.trim_start_matches('#')
            || self.status.as_str() == query
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProposalsPayload {
    pub proposals: Vec<Proposal>,
}

pub fn sort_newest_first(proposals: &mut [Proposal]) {
    proposals.sort_by(|a, b| b.proposal_num.cmp(&a.proposal_num));
}

pub fn active_proposals(proposals: &[Proposal]) -> Vec<Proposal> {
    let mut active: Vec<Proposal> = proposals
        .iter()
        .filter(|p| p.status == ProposalStatus::Active)
        .cloned()
        .collect();
    sort_newest_first(&mut active);
    active
}

/// Latest non-active proposals
pub fn recent_proposals(proposals: &[Proposal], limit: usize) -> Vec<Proposal> {
    let mut recent: Vec<Proposal> = proposals
        .iter()
        .filter(|p| p.status != ProposalStatus::Active)
        .cloned()
        .collect();
    sort_newest_first(&mut recent);
    recent.truncate(limit);
    recent
}

pub fn search_proposals(proposals: &[Proposal], query: &str) -> Vec<Proposal> {
    let mut found: Vec<Proposal> = proposals.iter().filter(|p| p.matches(query)).cloned().collect();
    sort_newest_first(&mut found);
    found
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delegate {
    pub address: String,
    pub voting_power: f64,
    pub delegators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelegatesPayload {
    pub delegates: BTreeMap<String, Delegate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopDelegatesPayload {
    pub delegates: Vec<Delegate>,
}

/// Replay delegation logs into each delegate's current voting power and
/// delegators
pub fn fold_delegates(mut events: Vec<DelegateEvent>) -> DelegatesPayload {
    events.sort_by_key(|e| e.position());

    let mut power: HashMap<Address, U256> = HashMap::new();
    let mut delegate_of: HashMap<Address, Address> = HashMap::new();

    for event in events {
        match event {
            DelegateEvent::Changed { delegator, to_delegate, .. } => {
                if to_delegate.is_zero() {
                    delegate_of.remove(&delegator);
                } else {
                    delegate_of.insert(delegator, to_delegate);
                }
            }
            DelegateEvent::VotesChanged { delegate, new_balance, .. } => {
                power.insert(delegate, new_balance);
            }
        }
    }

    let mut delegators: HashMap<Address, HashSet<Address>> = HashMap::new();
    for (delegator, delegate) in delegate_of {
        delegators.entry(delegate).or_default().insert(delegator);
    }

    let addresses: HashSet<Address> = power.keys().chain(delegators.keys()).copied().collect();
    let delegates = addresses
        .into_iter()
        .map(|address| {
            let mut list: Vec<String> = delegators
                .get(&address)
                .map(|set| set.iter().map(|a| format!("{:?}", a)).collect())
                .unwrap_or_default();
            list.sort();
            let key = format!("{:?}", address);
            let delegate = Delegate {
                address: key.clone(),
                voting_power: bn_to_number(power.get(&address).copied().unwrap_or_default(), VOTE_DECIMALS),
                delegators: list,
                rank: None,
            };
            (key, delegate)
        })
        .collect();

    DelegatesPayload { delegates }
}

/// Keep delegates whose address contains `filter` (case-insensitive)
pub fn filter_delegates(payload: &DelegatesPayload, filter: &str) -> DelegatesPayload {
    let filter = filter.trim().to_lowercase();
    DelegatesPayload {
        delegates: payload
            .delegates
            .iter()
            .filter(|(address, _)| filter.is_empty() || address.to_lowercase().contains(&filter))
            .map(|(address, delegate)| (address.clone(), delegate.clone()))
            .collect(),
    }
}

/// Delegates with voting power, strongest first, ranked from 1
pub fn top_delegates(payload: &DelegatesPayload) -> Vec<Delegate> {
    let mut delegates: Vec<Delegate> = payload
        .delegates
        .values()
        .filter(|d| d.voting_power > 0.0)
        .cloned()
        .collect();
    delegates.sort_by(|a, b| b.voting_power.total_cmp(&a.voting_power));
    for (i, delegate) in delegates.iter_mut().enumerate() {
        delegate.rank = Some(i + 1);
    }
    delegates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(num: u64, status: ProposalStatus) -> Proposal {
        Proposal {
            proposal_num: num,
            proposer: format!("0x{:040x}", num),
            status,
            for_votes: 0.0,
            against_votes: 0.0,
            start_block: 0,
            end_block: 0,
            eta: 0,
        }
    }

    fn nums(proposals: &[Proposal]) -> Vec<u64> {
        proposals.iter().map(|p| p.proposal_num).collect()
    }

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn votes(delegate: u8, tokens: u64, block: u64) -> DelegateEvent {
        DelegateEvent::VotesChanged {
            delegate: addr(delegate),
            new_balance: U256::exp10(18) * U256::from(tokens),
            block,
            log_index: 0,
        }
    }

    fn delegation(delegator: u8, to: u8, block: u64) -> DelegateEvent {
        DelegateEvent::Changed {
            delegator: addr(delegator),
            from_delegate: Address::zero(),
            to_delegate: addr(to),
            block,
            log_index: 1,
        }
    }

    #[test]
    fn test_status_ordinals() {
        assert_eq!(ProposalStatus::from_ordinal(0), Some(ProposalStatus::Pending));
        assert_eq!(ProposalStatus::from_ordinal(7), Some(ProposalStatus::Executed));
        assert_eq!(ProposalStatus::from_ordinal(8), None);
        assert_eq!("QUEUED".parse::<ProposalStatus>(), Ok(ProposalStatus::Queued));
        assert!("unknown".parse::<ProposalStatus>().is_err());
    }

    #[test]
    fn test_from_raw_scales_votes() {
        let raw = RawProposal {
            id: 12,
            proposer: addr(3),
            eta: 0,
            start_block: 100,
            end_block: 200,
            for_votes: U256::exp10(18) * U256::from(1500u64),
            against_votes: U256::zero(),
            canceled: false,
            executed: true,
            state: 7,
        };
        let proposal = Proposal::from_raw(&raw).unwrap();
        assert_eq!(proposal.for_votes, 1500.0);
        assert_eq!(proposal.status, ProposalStatus::Executed);
        assert_eq!(proposal.proposer, format!("{:?}", addr(3)));

        let bad = RawProposal { state: 42, ..raw };
        assert!(Proposal::from_raw(&bad).is_none());
    }

    #[test]
    fn test_active_and_recent_lists() {
        let mut all = vec![
            proposal(1, ProposalStatus::Executed),
            proposal(5, ProposalStatus::Active),
            proposal(3, ProposalStatus::Defeated),
            proposal(7, ProposalStatus::Active),
        ];
        all.extend((8..20).map(|n| proposal(n, ProposalStatus::Executed)));

        assert_eq!(nums(&active_proposals(&all)), vec![7, 5]);

        let recent = recent_proposals(&all, RECENT_PROPOSALS);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].proposal_num, 19);
        assert!(recent.iter().all(|p| p.status != ProposalStatus::Active));
    }

    #[test]
    fn test_search() {
        let all = vec![
            proposal(1, ProposalStatus::Executed),
            proposal(2, ProposalStatus::Queued),
            proposal(3, ProposalStatus::Queued),
        ];
        assert_eq!(nums(&search_proposals(&all, "queued")), vec![3, 2]);
        assert_eq!(nums(&search_proposals(&all, "#1")), vec![1]);
        assert_eq!(nums(&search_proposals(&all, "")), vec![3, 2, 1]);
        assert_eq!(nums(&search_proposals(&all, &format!("{:040x}", 2))), vec![2]);
    }

    #[test]
    fn test_fold_delegates_tracks_latest_power_and_delegators() {
        let events = vec![
            votes(0xaa, 50, 20),
            delegation(1, 0xaa, 10),
            delegation(2, 0xaa, 11),
            votes(0xaa, 10, 12),
            // delegator 2 moves to 0xbb
            DelegateEvent::Changed {
                delegator: addr(2),
                from_delegate: addr(0xaa),
                to_delegate: addr(0xbb),
                block: 30,
                log_index: 0,
            },
            votes(0xbb, 7, 30),
        ];

        let payload = fold_delegates(events);
        let aa = &payload.delegates[&format!("{:?}", addr(0xaa))];
        let bb = &payload.delegates[&format!("{:?}", addr(0xbb))];

        assert_eq!(aa.voting_power, 50.0);
        assert_eq!(aa.delegators, vec![format!("{:?}", addr(1))]);
        assert_eq!(bb.voting_power, 7.0);
        assert_eq!(bb.delegators, vec![format!("{:?}", addr(2))]);
    }

    #[test]
    fn test_undelegation_removes_delegator() {
        let events = vec![
            delegation(1, 0xaa, 1),
            DelegateEvent::Changed {
                delegator: addr(1),
                from_delegate: addr(0xaa),
                to_delegate: Address::zero(),
                block: 2,
                log_index: 0,
            },
            votes(0xaa, 0, 2),
        ];
        let payload = fold_delegates(events);
        let aa = &payload.delegates[&format!("{:?}", addr(0xaa))];
        assert!(aa.delegators.is_empty());
    }

    #[test]
    fn test_top_delegates_ranking() {
        let payload = fold_delegates(vec![
            votes(1, 5, 1),
            votes(2, 0, 1),
            votes(3, 9, 1),
            votes(4, 7, 1),
        ]);

        let top = top_delegates(&payload);
        let ranked: Vec<(f64, Option<usize>)> = top.iter().map(|d| (d.voting_power, d.rank)).collect();
        assert_eq!(ranked, vec![(9.0, Some(1)), (7.0, Some(2)), (5.0, Some(3))]);
    }

    #[test]
    fn test_filter_delegates_by_address() {
        let payload = fold_delegates(vec![votes(0xab, 1, 1), votes(0xcd, 1, 1)]);
        let filtered = filter_delegates(&payload, "ABAB");
        assert_eq!(filtered.delegates.len(), 1);
        assert_eq!(filter_delegates(&payload, "").delegates.len(), 2);
    }
}
