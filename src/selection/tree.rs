use std::collections::HashSet;

use crate::models::{CustomCategory, ItemEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Checked,
    Partial,
    Unchecked,
}

/// Catalog entries grouped by category, with the user's current selection.
///
/// The selection is a set of entry ids; names are always looked up from the
/// entries, so a refreshed catalog never leaves dangling names behind.
#[derive(Debug, Clone, Default)]
pub struct SelectionTree {
    entries: Vec<ItemEntry>,
    custom_groups: Vec<CustomCategory>,
    selected: HashSet<String>,
    filter: String,
}

impl SelectionTree {
    pub fn new(entries: Vec<ItemEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Replaces the catalog, keeping only selected ids that still exist.
    pub fn refresh(&mut self, entries: Vec<ItemEntry>) {
        let ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        self.selected.retain(|id| ids.contains(id.as_str()));
        self.entries = entries;
    }

    pub fn set_custom_groups(&mut self, groups: Vec<CustomCategory>) {
        self.custom_groups = groups;
    }

    pub fn custom_groups(&self) -> &[CustomCategory] {
        &self.custom_groups
    }

    pub fn entries(&self) -> &[ItemEntry] {
        &self.entries
    }

    pub fn set_filter(&mut self, term: &str) {
        self.filter = term.trim().to_lowercase();
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn toggle_item(&mut self, id: &str) {
        if !self.entries.iter().any(|e| e.id == id) {
            return;
        }
        if !self.selected.remove(id) {
            self.selected.insert(id.to_string());
        }
    }

    pub fn toggle_category(&mut self, category: &str) {
        let ids = self.ids_where(|e| e.category == category);
        self.toggle_all(ids);
    }

    pub fn toggle_custom_group(&mut self, group_id: &str) {
        let Some(group) = self.custom_groups.iter().find(|g| g.id == group_id) else {
            return;
        };
        let names: HashSet<&str> = group.items.iter().map(String::as_str).collect();
        let ids = self.ids_where(|e| names.contains(e.name.as_str()));
        self.toggle_all(ids);
    }

    /// Selects every entry whose name is in `names`. Returns the names that
    /// matched nothing.
    pub fn select_names<'a>(&mut self, names: &'a [String]) -> Vec<&'a str> {
        let mut unknown = Vec::new();
        for name in names {
            let ids = self.ids_where(|e| &e.name == name);
            if ids.is_empty() {
                unknown.push(name.as_str());
            }
            self.selected.extend(ids);
        }
        unknown
    }

    /// Replaces the selection with the entries the current filter shows.
    pub fn select_all(&mut self) {
        self.selected = self.visible_entries().map(|e| e.id.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn visible_entries(&self) -> impl Iterator<Item = &ItemEntry> {
        self.entries
            .iter()
            .filter(move |e| self.filter.is_empty() || e.matches_filter(&self.filter))
    }

    /// Visible entries grouped by category, categories in first-seen order.
    pub fn visible_categories(&self) -> Vec<(&str, Vec<&ItemEntry>)> {
        let mut groups: Vec<(&str, Vec<&ItemEntry>)> = Vec::new();
        for entry in self.visible_entries() {
            match groups.iter_mut().find(|(name, _)| *name == entry.category) {
                Some((_, members)) => members.push(entry),
                None => groups.push((entry.category.as_str(), vec![entry])),
            }
        }
        groups
    }

    pub fn category_state(&self, category: &str) -> CheckState {
        let mut total = 0;
        let mut selected = 0;
        for entry in self.entries.iter().filter(|e| e.category == category) {
            total += 1;
            if self.selected.contains(&entry.id) {
                selected += 1;
            }
        }

        if total > 0 && selected == total {
            CheckState::Checked
        } else if selected > 0 {
            CheckState::Partial
        } else {
            CheckState::Unchecked
        }
    }

    /// Names to send to the backend, in catalog order without repeats.
    pub fn selected_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| self.selected.contains(&e.id))
            .filter(|e| seen.insert(e.name.as_str()))
            .map(|e| e.name.clone())
            .collect()
    }

    fn ids_where(&self, predicate: impl Fn(&ItemEntry) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| predicate(e))
            .map(|e| e.id.clone())
            .collect()
    }

    // Selects all of `ids`, or deselects them when all are already selected
    fn toggle_all(&mut self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        if ids.iter().all(|id| self.selected.contains(id)) {
            for id in &ids {
                self.selected.remove(id);
            }
        } else {
            self.selected.extend(ids);
        }
    }
}
