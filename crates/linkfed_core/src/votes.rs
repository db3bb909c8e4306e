/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use linkfed_vocab::Kind;

use crate::account::Account;
use crate::vote::Vote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteStep {
    Undo(String),
    Assert(Kind),
}

/// The account's active vote among `votes`, newest first when the listing
/// holds more than one (a lost race between two writers).
pub fn find_prior<'a>(votes: &'a [Vote], voter: &Account) -> Option<&'a Vote> {
    votes
        .iter()
        .filter(|v| v.voter_is(voter) && v.direction() != 0)
        .max_by_key(|v| v.date())
}

/// Writes turning `prior` into `weight`. Same direction means nothing to do;
/// a change retracts the prior vote before asserting the new one.
pub fn plan(prior: Option<&Vote>, weight: i8) -> Vec<VoteStep> {
    let new = weight.signum();
    let old = prior.map(Vote::direction).unwrap_or(0);
    if old == new {
        return Vec::new();
    }
    let mut steps = Vec::with_capacity(2);
    if old != 0 {
        if let Some(iri) = prior.and_then(|p| p.iri.clone()) {
            steps.push(VoteStep::Undo(iri));
        }
    }
    match new {
        1 => steps.push(VoteStep::Assert(Kind::Like)),
        -1 => steps.push(VoteStep::Assert(Kind::Dislike)),
        _ => {}
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemRef;

    fn prior(weight: i8) -> Vote {
        let mut v = Vote::new(
            Account::from_iri("https://fed.example/actors/alice"),
            ItemRef::new("https://fed.example/objects/1"),
            weight,
        );
        v.iri = Some("https://fed.example/activities/like-1".into());
        v
    }

    #[test]
    fn same_direction_is_a_no_op() {
        assert!(plan(Some(&prior(1)), 1).is_empty());
        assert!(plan(None, 0).is_empty());
    }

    #[test]
    fn flip_undoes_first() {
        assert_eq!(
            plan(Some(&prior(1)), -1),
            vec![
                VoteStep::Undo("https://fed.example/activities/like-1".into()),
                VoteStep::Assert(Kind::Dislike)
            ]
        );
        assert_eq!(
            plan(Some(&prior(-1)), 0),
            vec![VoteStep::Undo("https://fed.example/activities/like-1".into())]
        );
        assert_eq!(plan(None, 1), vec![VoteStep::Assert(Kind::Like)]);
    }

    #[test]
    fn prior_belongs_to_the_voter() {
        let votes = vec![prior(1)];
        assert!(find_prior(&votes, &Account::from_iri("https://fed.example/actors/alice/")).is_some());
        assert!(find_prior(&votes, &Account::from_iri("https://fed.example/actors/bob")).is_none());
    }
}
