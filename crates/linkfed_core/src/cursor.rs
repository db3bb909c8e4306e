/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::HashMap;

use crate::filters::CursorRef;
use crate::iri;
use crate::renderable::Renderable;

/// Listing results in arrival order, one entry per IRI.
#[derive(Debug, Default)]
pub struct ResultSet {
    entries: HashMap<String, Renderable>,
    order: Vec<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, r: Renderable) -> bool {
        // entities without an IRI are not listable
        let Some(key) = r.iri().map(iri::recipient_key) else {
            return false;
        };
        if self.entries.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.entries.insert(key, r);
        true
    }

    pub fn contains(&self, target: &str) -> bool {
        self.entries.contains_key(&iri::recipient_key(target))
    }

    pub fn get(&self, target: &str) -> Option<&Renderable> {
        self.entries.get(&iri::recipient_key(target))
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut Renderable> {
        self.entries.get_mut(&iri::recipient_key(target))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Renderable> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Renderable> {
        self.entries.values_mut()
    }

    pub fn into_vec(mut self) -> Vec<Renderable> {
        self.order
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct Cursor {
    pub items: Vec<Renderable>,
    pub before: Option<CursorRef>,
    pub after: Option<CursorRef>,
    pub total: usize,
}

impl Cursor {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keeps at most `max_items` entries. `more` is set when a source still
    /// has pages past the ones crawled; `paged` when this page started after
    /// a token.
    pub fn new(mut items: Vec<Renderable>, max_items: usize, total: usize, more: bool, paged: bool) -> Self {
        let total = total.max(items.len());
        let more = more || items.len() > max_items;
        items.truncate(max_items);
        let after = if more {
            items.last().and_then(Renderable::iri).map(CursorRef::of)
        } else {
            None
        };
        let before = if paged {
            items.first().and_then(Renderable::iri).map(CursorRef::of)
        } else {
            None
        };
        Self {
            items,
            before,
            after,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Renderable> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::item::Item;

    #[test]
    fn result_set_keeps_first_and_order() {
        let mut rs = ResultSet::new();
        assert!(rs.insert(Renderable::Item(Item::from_iri("https://h/o/2"))));
        assert!(rs.insert(Renderable::Account(Account::from_iri("https://h/actors/a"))));
        assert!(!rs.insert(Renderable::Item(Item::from_iri("https://h/o/2/"))));
        assert!(!rs.insert(Renderable::Item(Item::default())));
        let iris: Vec<_> = rs.iter().filter_map(|r| r.iri().map(str::to_string)).collect();
        assert_eq!(iris, vec!["https://h/o/2", "https://h/actors/a"]);
        assert_eq!(rs.into_vec().len(), 2);
    }

    #[test]
    fn cursor_tokens() {
        let items: Vec<_> = (0..5)
            .map(|i| Renderable::Item(Item::from_iri(&format!("https://h/o/{i}"))))
            .collect();
        let c = Cursor::new(items, 3, 5, false, false);
        assert_eq!(c.len(), 3);
        assert_eq!(c.total, 5);
        assert_eq!(c.after, Some(CursorRef::of("https://h/o/2")));
        assert!(c.before.is_none());

        let last = Cursor::new(vec![Renderable::Item(Item::from_iri("https://h/o/9"))], 3, 1, false, true);
        assert!(last.after.is_none());
        assert_eq!(last.before, Some(CursorRef::of("https://h/o/9")));
    }

    #[test]
    fn final_page_has_no_after_token() {
        let page = |ids: &[u32]| -> Vec<Renderable> {
            ids.iter()
                .map(|i| Renderable::Item(Item::from_iri(&format!("https://h/o/{i}"))))
                .collect()
        };
        // the collection holds 7, the source had nothing past this page
        let tail = Cursor::new(page(&[0]), 3, 7, false, true);
        assert_eq!(tail.total, 7);
        assert!(tail.after.is_none());

        let middle = Cursor::new(page(&[3, 2, 1]), 3, 7, true, true);
        assert_eq!(middle.after, Some(CursorRef::of("https://h/o/1")));
    }
}
