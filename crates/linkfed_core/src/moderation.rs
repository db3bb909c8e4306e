/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use linkfed_vocab::{Kind, Object};
use time::OffsetDateTime;

use crate::account::Account;
use crate::hash::Hash;
use crate::iri;
use crate::item::MimeType;
use crate::renderable::Renderable;
use crate::tag::Tag;

/// A Block, Flag, Ignore, Delete or Update aimed at an item or account.
#[derive(Debug, Clone)]
pub struct ModerationOp {
    pub hash: Hash,
    pub iri: Option<String>,
    pub kind: Kind,
    pub submitted_by: Option<Account>,
    pub target: Option<Box<Renderable>>,
    pub target_iri: Option<String>,
    pub reason: String,
    pub mime_type: MimeType,
    pub in_reply_to: Vec<String>,
    pub tags: Vec<Tag>,
    pub created_at: Option<OffsetDateTime>,
    pub object: Option<Object>,
}

impl Default for ModerationOp {
    fn default() -> Self {
        Self {
            hash: Hash::default(),
            iri: None,
            kind: Kind::Flag,
            submitted_by: None,
            target: None,
            target_iri: None,
            reason: String::new(),
            mime_type: MimeType::default(),
            in_reply_to: Vec::new(),
            tags: Vec::new(),
            created_at: None,
            object: None,
        }
    }
}

impl ModerationOp {
    pub fn is_valid(&self) -> bool {
        self.hash.is_valid()
    }

    pub fn is_block(&self) -> bool {
        self.kind == Kind::Block
    }

    pub fn is_ignore(&self) -> bool {
        self.kind == Kind::Ignore
    }

    pub fn is_report(&self) -> bool {
        self.kind == Kind::Flag
    }

    /// Delete and Update are only meaningful as followups to a request.
    pub fn is_followup_kind(&self) -> bool {
        matches!(self.kind, Kind::Delete | Kind::Update)
    }

    pub fn target_iri(&self) -> Option<&str> {
        self.target_iri
            .as_deref()
            .or_else(|| self.target.as_ref().and_then(|t| t.iri()))
            .filter(|s| !s.is_empty())
    }

    pub fn submitter_iri(&self) -> Option<&str> {
        self.submitted_by.as_ref().and_then(Account::iri)
    }

    fn targets_itself(&self) -> bool {
        match (self.iri.as_deref(), self.target_iri()) {
            (Some(own), Some(target)) => iri::same_iri(own, target),
            _ => false,
        }
    }
}

/// Requests against one target, plus the application's later actions on it.
#[derive(Debug, Clone, Default)]
pub struct ModerationGroup {
    pub hash: Hash,
    pub target_iri: String,
    pub target: Option<Box<Renderable>>,
    pub created_at: Option<OffsetDateTime>,
    pub requests: Vec<ModerationOp>,
    pub followups: Vec<ModerationOp>,
}

impl ModerationGroup {
    fn seed(op: ModerationOp, target_iri: String) -> Self {
        Self {
            hash: op.hash,
            target_iri,
            target: op.target.clone(),
            created_at: op.created_at,
            requests: vec![op],
            followups: Vec::new(),
        }
    }

    pub fn is_block(&self) -> bool {
        self.requests.iter().any(ModerationOp::is_block)
    }

    pub fn is_report(&self) -> bool {
        self.requests.iter().any(ModerationOp::is_report)
    }

    pub fn is_ignore(&self) -> bool {
        self.requests.iter().any(ModerationOp::is_ignore)
    }

    pub fn date(&self) -> Option<OffsetDateTime> {
        self.created_at
    }

    fn accepts_followup(&self, op: &ModerationOp) -> bool {
        let same_target = op
            .target_iri()
            .map(|t| iri::same_iri(t, &self.target_iri))
            .unwrap_or(false);
        let answers_request = op.in_reply_to.iter().any(|r| {
            self.requests
                .iter()
                .filter_map(|q| q.iri.as_deref())
                .any(|q| iri::same_iri(q, r))
        });
        if !(same_target || answers_request) {
            return false;
        }
        match (self.created_at, op.created_at) {
            (Some(g), Some(f)) => f >= g,
            _ => true,
        }
    }
}

/// Groups a flat list of moderation ops by target.
///
/// Block/Flag/Ignore ops seed or join the group of their target. Delete and
/// Update ops issued by `app_iri` become followups of a matching group;
/// anything left over forms its own group. Ops without a target, targeting
/// themselves, or repeating an already grouped hash are dropped.
pub fn aggregate(ops: Vec<ModerationOp>, app_iri: Option<&str>) -> Vec<ModerationGroup> {
    let mut groups: Vec<ModerationGroup> = Vec::new();
    let mut seen: Vec<Hash> = Vec::new();
    let mut candidates: Vec<ModerationOp> = Vec::new();

    let by_app = |op: &ModerationOp| match (app_iri, op.submitter_iri()) {
        (Some(app), Some(by)) => iri::same_iri(app, by),
        _ => false,
    };

    for op in ops {
        if op.targets_itself() {
            continue;
        }
        if op.hash.is_valid() {
            if seen.contains(&op.hash) {
                continue;
            }
            seen.push(op.hash);
        }
        if op.is_followup_kind() && by_app(&op) {
            candidates.push(op);
            continue;
        }
        push_request(&mut groups, op);
    }

    for op in candidates {
        if let Some(g) = groups.iter_mut().find(|g| g.accepts_followup(&op)) {
            g.followups.push(op);
        } else {
            push_request(&mut groups, op);
        }
    }
    groups
}

fn push_request(groups: &mut Vec<ModerationGroup>, op: ModerationOp) {
    let Some(target) = op.target_iri().map(str::to_string) else {
        return;
    };
    match groups
        .iter_mut()
        .find(|g| iri::same_iri(&g.target_iri, &target))
    {
        Some(g) => {
            if let (Some(d), Some(g_date)) = (op.created_at, g.created_at) {
                if d < g_date {
                    g.created_at = Some(d);
                }
            }
            g.requests.push(op);
        }
        None => groups.push(ModerationGroup::seed(op, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const APP: &str = "https://fed.example/actors/app";
    const ITEM: &str = "https://fed.example/objects/1";

    fn op(iri: &str, kind: Kind, by: &str, target: &str, at: OffsetDateTime) -> ModerationOp {
        ModerationOp {
            hash: Hash::from_iri(iri),
            iri: Some(iri.to_string()),
            kind,
            submitted_by: Some(Account::from_iri(by)),
            target_iri: Some(target.to_string()),
            created_at: Some(at),
            ..Default::default()
        }
    }

    #[test]
    fn flags_on_same_item_form_one_group() {
        let ops = vec![
            op("https://fed.example/activities/f1", Kind::Flag, "https://fed.example/actors/a", ITEM, datetime!(2024-01-01 10:00 UTC)),
            op("https://fed.example/activities/f2", Kind::Flag, "https://fed.example/actors/b", ITEM, datetime!(2024-01-01 11:00 UTC)),
            op("https://fed.example/activities/f3", Kind::Flag, "https://fed.example/actors/c", ITEM, datetime!(2024-01-01 12:00 UTC)),
        ];
        let groups = aggregate(ops.clone(), Some(APP));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].requests.len(), 3);
        assert!(groups[0].followups.is_empty());
        assert!(groups[0].is_report());

        let mut with_delete = ops;
        with_delete.push(op("https://fed.example/activities/d1", Kind::Delete, APP, ITEM, datetime!(2024-01-02 09:00 UTC)));
        let groups = aggregate(with_delete, Some(APP));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].requests.len(), 3);
        assert_eq!(groups[0].followups.len(), 1);
    }

    #[test]
    fn earlier_or_foreign_deletes_are_not_followups() {
        let ops = vec![
            op("https://fed.example/activities/f1", Kind::Flag, "https://fed.example/actors/a", ITEM, datetime!(2024-01-02 10:00 UTC)),
            op("https://fed.example/activities/d0", Kind::Delete, APP, ITEM, datetime!(2024-01-01 10:00 UTC)),
            op("https://fed.example/activities/d1", Kind::Delete, "https://fed.example/actors/z", ITEM, datetime!(2024-01-03 10:00 UTC)),
        ];
        let groups = aggregate(ops, Some(APP));
        assert_eq!(groups.len(), 1);
        assert!(groups[0].followups.is_empty());
        assert_eq!(groups[0].requests.len(), 3);
    }

    #[test]
    fn duplicates_and_self_targets_are_dropped() {
        let f1 = op("https://fed.example/activities/f1", Kind::Block, "https://fed.example/actors/a", ITEM, datetime!(2024-01-01 10:00 UTC));
        let selfish = op("https://fed.example/activities/s", Kind::Flag, "https://fed.example/actors/a", "https://fed.example/activities/s", datetime!(2024-01-01 10:00 UTC));
        let groups = aggregate(vec![f1.clone(), f1, selfish], None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].requests.len(), 1);
        assert!(groups[0].is_block());
    }
}
