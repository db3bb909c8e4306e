/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Threaded views over loaded entities.
//!
//! Entities live once in an arena; parent links come from `Item::parent`
//! and `Account::created_by` and are kept in a separate topology table.

use std::cmp::Ordering;
use std::collections::HashMap;

use time::OffsetDateTime;

use crate::iri;
use crate::renderable::Renderable;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortOrder {
    /// Newest first.
    Date,
    /// Gravity ranking; plain date order when voting is off.
    Score { voting: bool },
    /// Most recently active subtree first.
    RecentActivity,
}

const GRAVITY: f64 = 1.2;

/// Ranking of a submission with `votes` net votes that is `age_hours` old.
pub fn hacker_score(votes: i64, age_hours: f64) -> f64 {
    (votes - 1) as f64 / (age_hours.max(0.0) + 2.0).powf(GRAVITY)
}

fn score_of(r: &Renderable) -> i64 {
    match r {
        Renderable::Item(i) if i.score != 0 => i.score,
        Renderable::Item(i) => i.vote_score(),
        _ => 0,
    }
}

fn parent_iri(r: &Renderable) -> Option<&str> {
    match r {
        Renderable::Item(i) => i.parent.as_ref().map(|p| p.iri.as_str()),
        Renderable::Account(a) => a.created_by.as_ref().and_then(|c| c.iri()),
        _ => None,
    }
}

pub struct Thread {
    nodes: Vec<Renderable>,
    index: HashMap<String, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl Thread {
    /// Builds the arena. Later duplicates of an IRI are dropped; a link that
    /// would make an entity its own ancestor is ignored.
    pub fn build(entities: Vec<Renderable>) -> Self {
        let mut nodes = Vec::with_capacity(entities.len());
        let mut index = HashMap::new();
        for e in entities {
            match e.iri().map(iri::recipient_key) {
                Some(k) if index.contains_key(&k) => continue,
                Some(k) => {
                    index.insert(k, nodes.len());
                }
                None => {}
            }
            nodes.push(e);
        }

        let n = nodes.len();
        let mut parent: Vec<Option<usize>> = vec![None; n];
        for (idx, node) in nodes.iter().enumerate() {
            let Some(p) = parent_iri(node).and_then(|p| index.get(&iri::recipient_key(p))).copied() else {
                continue;
            };
            if p == idx {
                continue;
            }
            // walk up from the candidate parent; reaching idx means a cycle
            let mut cur = Some(p);
            let mut cyclic = false;
            let mut steps = 0;
            while let Some(c) = cur {
                if c == idx || steps > n {
                    cyclic = true;
                    break;
                }
                cur = parent[c];
                steps += 1;
            }
            if !cyclic {
                parent[idx] = Some(p);
            }
        }

        let mut children = vec![Vec::new(); n];
        let mut roots = Vec::new();
        for (idx, p) in parent.iter().enumerate() {
            match p {
                Some(p) => children[*p].push(idx),
                None => roots.push(idx),
            }
        }
        Self {
            nodes,
            index,
            parent,
            children,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn idx(&self, target: &str) -> Option<usize> {
        self.index.get(&iri::recipient_key(target)).copied()
    }

    pub fn get(&self, target: &str) -> Option<&Renderable> {
        self.idx(target).map(|i| &self.nodes[i])
    }

    pub fn roots(&self) -> impl Iterator<Item = &Renderable> {
        self.roots.iter().map(|i| &self.nodes[*i])
    }

    pub fn children(&self, target: &str) -> Vec<&Renderable> {
        self.idx(target)
            .map(|i| self.children[i].iter().map(|c| &self.nodes[*c]).collect())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, target: &str) -> Option<&Renderable> {
        self.idx(target).and_then(|i| self.parent[i]).map(|p| &self.nodes[p])
    }

    fn walk(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|r| (*r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            out.push((idx, depth));
            for c in self.children[idx].iter().rev() {
                stack.push((*c, depth + 1));
            }
        }
        out
    }

    /// Depth-first listing with the depth of each entry.
    pub fn flatten(&self) -> Vec<(usize, &Renderable)> {
        self.walk().into_iter().map(|(idx, depth)| (depth, &self.nodes[idx])).collect()
    }

    /// Consumes the arena in depth-first order, replies right after their
    /// parent.
    pub fn into_ordered(self) -> Vec<Renderable> {
        let order = self.walk();
        let mut slots: Vec<Option<Renderable>> = self.nodes.into_iter().map(Some).collect();
        order.into_iter().filter_map(|(idx, _)| slots[idx].take()).collect()
    }

    fn last_activity_idx(&self, idx: usize) -> Option<OffsetDateTime> {
        let mut latest = self.nodes[idx].date();
        let mut stack = self.children[idx].clone();
        while let Some(c) = stack.pop() {
            latest = latest.max(self.nodes[c].date());
            stack.extend(self.children[c].iter().copied());
        }
        latest
    }

    /// Latest date anywhere in the subtree rooted at `target`.
    pub fn last_activity(&self, target: &str) -> Option<OffsetDateTime> {
        self.idx(target).and_then(|i| self.last_activity_idx(i))
    }

    pub fn into_entities(self) -> Vec<Renderable> {
        self.nodes
    }

    /// Orders roots and every child list.
    pub fn sort(&mut self, order: SortOrder, now: OffsetDateTime) {
        let recent: Vec<Option<OffsetDateTime>> = match order {
            SortOrder::RecentActivity => (0..self.nodes.len()).map(|i| self.last_activity_idx(i)).collect(),
            _ => Vec::new(),
        };
        let nodes = &self.nodes;
        let cmp = |a: &usize, b: &usize| match order {
            SortOrder::RecentActivity => recent[*b].cmp(&recent[*a]),
            _ => compare(&nodes[*a], &nodes[*b], order, now),
        };
        self.roots.sort_by(cmp);
        for list in self.children.iter_mut() {
            list.sort_by(cmp);
        }
    }
}

pub fn by_date(a: &Renderable, b: &Renderable) -> Ordering {
    b.date().cmp(&a.date())
}

pub fn by_score(a: &Renderable, b: &Renderable, voting: bool, now: OffsetDateTime) -> Ordering {
    let (sa, sb) = (score_of(a), score_of(b));
    if !voting || (sa == 0 && sb == 0) {
        return by_date(a, b);
    }
    let age = |r: &Renderable| {
        r.date()
            .map(|d| (now - d).as_seconds_f64() / 3600.0)
            .unwrap_or(f64::MAX / 2.0)
    };
    let (ha, hb) = (hacker_score(sa, age(a)), hacker_score(sb, age(b)));
    hb.partial_cmp(&ha).unwrap_or(Ordering::Equal).then_with(|| by_date(a, b))
}

fn compare(a: &Renderable, b: &Renderable, order: SortOrder, now: OffsetDateTime) -> Ordering {
    match order {
        SortOrder::Date | SortOrder::RecentActivity => by_date(a, b),
        SortOrder::Score { voting } => by_score(a, b, voting, now),
    }
}

/// Sorts a flat listing. Recent activity needs the thread and falls back to
/// date order here.
pub fn sort_flat(list: &mut [Renderable], order: SortOrder, now: OffsetDateTime) {
    list.sort_by(|a, b| compare(a, b, order, now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, ItemRef};
    use time::macros::datetime;
    use time::Duration;

    fn item(id: &str, parent: Option<&str>, at: OffsetDateTime) -> Renderable {
        let mut it = Item::from_iri(id);
        it.parent = parent.map(ItemRef::new);
        it.created_at = Some(at);
        Renderable::Item(it)
    }

    #[test]
    fn builds_topology_and_flattens() {
        let t0 = datetime!(2024-05-01 12:00 UTC);
        let t = Thread::build(vec![
            item("https://h/o/root", None, t0),
            item("https://h/o/a", Some("https://h/o/root"), t0 + Duration::hours(1)),
            item("https://h/o/b", Some("https://h/o/a"), t0 + Duration::hours(5)),
            item("https://h/o/c", Some("https://h/o/root"), t0 + Duration::hours(2)),
            item("https://h/o/a", None, t0),
        ]);
        assert_eq!(t.len(), 4);
        assert_eq!(t.roots().count(), 1);
        assert_eq!(t.children("https://h/o/root").len(), 2);
        let flat: Vec<_> = t.flatten().into_iter().map(|(d, r)| (d, r.iri().unwrap().to_string())).collect();
        assert_eq!(flat[2], (2, "https://h/o/b".to_string()));
        assert_eq!(t.last_activity("https://h/o/root"), Some(t0 + Duration::hours(5)));
        assert_eq!(t.parent_of("https://h/o/b").and_then(Renderable::iri), Some("https://h/o/a"));
    }

    #[test]
    fn cycles_are_broken() {
        let t0 = datetime!(2024-05-01 12:00 UTC);
        let t = Thread::build(vec![
            item("https://h/o/x", Some("https://h/o/y"), t0),
            item("https://h/o/y", Some("https://h/o/x"), t0),
            item("https://h/o/z", Some("https://h/o/z"), t0),
        ]);
        assert_eq!(t.roots().count(), 2);
        assert_eq!(t.flatten().len(), 3);
    }

    #[test]
    fn recent_activity_ordering() {
        let t0 = datetime!(2024-05-01 12:00 UTC);
        let mut t = Thread::build(vec![
            item("https://h/o/old", None, t0),
            item("https://h/o/new", None, t0 + Duration::hours(3)),
            item("https://h/o/reply", Some("https://h/o/old"), t0 + Duration::hours(9)),
        ]);
        t.sort(SortOrder::Date, t0);
        assert_eq!(t.roots().next().and_then(Renderable::iri), Some("https://h/o/new"));
        t.sort(SortOrder::RecentActivity, t0);
        assert_eq!(t.roots().next().and_then(Renderable::iri), Some("https://h/o/old"));
    }

    #[test]
    fn ordered_output_nests_replies() {
        let t0 = datetime!(2024-05-01 12:00 UTC);
        let mut t = Thread::build(vec![
            item("https://h/o/new", None, t0 + Duration::hours(3)),
            item("https://h/o/old", None, t0),
            item("https://h/o/r1", Some("https://h/o/new"), t0 + Duration::hours(4)),
            item("https://h/o/r2", Some("https://h/o/r1"), t0 + Duration::hours(5)),
        ]);
        t.sort(SortOrder::Date, t0);
        let got: Vec<String> = t
            .into_ordered()
            .iter()
            .filter_map(|r| r.iri().map(str::to_string))
            .collect();
        assert_eq!(got, ["https://h/o/new", "https://h/o/r1", "https://h/o/r2", "https://h/o/old"]);
    }

    #[test]
    fn gravity_ranks_fresh_votes_higher() {
        let now = datetime!(2024-05-02 12:00 UTC);
        let mut fresh = Item::from_iri("https://h/o/fresh");
        fresh.created_at = Some(now - Duration::hours(1));
        fresh.score = 5;
        let mut stale = Item::from_iri("https://h/o/stale");
        stale.created_at = Some(now - Duration::hours(30));
        stale.score = 20;
        let mut list = vec![Renderable::Item(stale), Renderable::Item(fresh)];
        sort_flat(&mut list, SortOrder::Score { voting: true }, now);
        assert_eq!(list[0].iri(), Some("https://h/o/fresh"));
        sort_flat(&mut list, SortOrder::Score { voting: false }, now);
        assert_eq!(list[0].iri(), Some("https://h/o/fresh"));
        assert!(hacker_score(1, 0.0).abs() < f64::EPSILON);
    }
}
