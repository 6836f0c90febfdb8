use crate::model::{ColumnDef, Resource, TagMap};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SortState {
    pub column: Option<usize>,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: None,
            ascending: true,
        }
    }
}

/// The loaded page plus its client-side derivation: free-text filter,
/// then tag filter, then a stable sort. Nothing here ever refetches.
#[derive(Debug, Default)]
pub struct PageView {
    columns: Vec<ColumnDef>,
    resources: Vec<Arc<dyn Resource>>,
    rows: Vec<Vec<String>>,
    query: String,
    tag_filters: TagMap,
    sort: SortState,
    visible: Vec<usize>,
    cursor: usize,
    available_tags: BTreeMap<String, BTreeSet<String>>,
}

impl PageView {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    /// Replaces the loaded page. Tag values are recomputed from it alone.
    pub fn set_page(&mut self, resources: Vec<Arc<dyn Resource>>) {
        self.rows = resources
            .iter()
            .map(|resource| resource.table_row())
            .collect();
        self.available_tags = collect_tag_values(&resources);
        self.resources = resources;
        self.cursor = 0;
        self.derive();
    }

    pub fn clear_filters(&mut self) {
        self.query.clear();
        self.tag_filters.clear();
        self.sort = SortState::default();
        self.derive();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.derive();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_tag_filter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tag_filters.insert(key.into(), value.into());
        self.derive();
    }

    pub fn remove_tag_filter(&mut self, key: &str) -> bool {
        let removed = self.tag_filters.remove(key).is_some();
        if removed {
            self.derive();
        }
        removed
    }

    pub fn clear_tag_filters(&mut self) {
        self.tag_filters.clear();
        self.derive();
    }

    pub fn tag_filters(&self) -> &TagMap {
        &self.tag_filters
    }

    pub fn available_tags(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.available_tags
    }

    /// Moves to the next sortable column, wrapping around. Returns false
    /// when the schema has no sortable column.
    pub fn cycle_sort_column(&mut self) -> bool {
        let sortable = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.sortable)
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let Some(&first) = sortable.first() else {
            return false;
        };
        let next = match self.sort.column {
            Some(current) => sortable
                .iter()
                .copied()
                .find(|index| *index > current)
                .unwrap_or(first),
            None => first,
        };
        self.sort.column = Some(next);
        self.derive();
        true
    }

    pub fn toggle_sort_direction(&mut self) {
        self.sort.ascending = !self.sort.ascending;
        self.derive();
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn sort_column_title(&self) -> Option<&'static str> {
        self.sort
            .column
            .and_then(|index| self.columns.get(index))
            .map(|column| column.title)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn loaded_len(&self) -> usize {
        self.resources.len()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &[String]> + '_ {
        self.visible.iter().map(|index| self.rows[*index].as_slice())
    }

    #[cfg(test)]
    pub fn visible_ids(&self) -> Vec<String> {
        self.visible
            .iter()
            .map(|index| self.resources[*index].id().to_string())
            .collect()
    }

    pub fn selected(&self) -> Option<&Arc<dyn Resource>> {
        let index = self.visible.get(self.cursor)?;
        self.resources.get(*index)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            self.cursor = 0;
            return;
        }
        let last = self.visible.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    /// Moves the cursor onto `id` if it is visible.
    pub fn select_id(&mut self, id: &str) -> bool {
        match self
            .visible
            .iter()
            .position(|index| self.resources[*index].id() == id)
        {
            Some(position) => {
                self.cursor = position;
                true
            }
            None => false,
        }
    }

    /// Swaps in a fresh copy of a loaded resource and re-derives the view,
    /// keeping the cursor on the same resource. `false` when the id is not
    /// on this page.
    pub fn replace_resource(&mut self, resource: Arc<dyn Resource>) -> bool {
        let Some(index) = self
            .resources
            .iter()
            .position(|existing| existing.id() == resource.id())
        else {
            return false;
        };
        let selected = self.selected().map(|current| current.id().to_string());
        self.rows[index] = resource.table_row();
        self.resources[index] = resource;
        self.available_tags = collect_tag_values(&self.resources);
        self.derive();
        if let Some(id) = selected {
            self.select_id(&id);
        }
        true
    }

    pub fn select_first(&mut self) {
        self.cursor = 0;
    }

    pub fn select_last(&mut self) {
        self.cursor = self.visible.len().saturating_sub(1);
    }

    fn derive(&mut self) {
        let query = self.query.trim().to_lowercase();
        let mut visible = (0..self.resources.len())
            .filter(|index| matches_query(&self.rows[*index], &query))
            .filter(|index| matches_tags(self.resources[*index].tags(), &self.tag_filters))
            .collect::<Vec<_>>();

        if let Some(column) = self.sort.column {
            let rows = &self.rows;
            let key = |index: &usize| rows[*index].get(column).map(String::as_str).unwrap_or("");
            if self.sort.ascending {
                visible.sort_by(|a, b| compare_cells(key(a), key(b)));
            } else {
                visible.sort_by(|a, b| compare_cells(key(b), key(a)));
            }
        }

        self.visible = visible;
        if self.visible.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor = self.cursor.min(self.visible.len() - 1);
        }
    }
}

/// Case-insensitive substring match against any cell. `query` must
/// already be lowercase.
pub fn matches_query(row: &[String], query: &str) -> bool {
    query.is_empty() || row.iter().any(|cell| cell.to_lowercase().contains(query))
}

/// Every filter key must be present with a value containing the filter
/// value, ignoring case.
pub fn matches_tags(tags: &TagMap, filters: &TagMap) -> bool {
    filters.iter().all(|(key, wanted)| {
        tags.get(key)
            .is_some_and(|value| value.to_lowercase().contains(&wanted.to_lowercase()))
    })
}

pub fn collect_tag_values(resources: &[Arc<dyn Resource>]) -> BTreeMap<String, BTreeSet<String>> {
    let mut values = BTreeMap::<String, BTreeSet<String>>::new();
    for resource in resources {
        for (key, value) in resource.tags() {
            values.entry(key.clone()).or_default().insert(value.clone());
        }
    }
    values
}

fn compare_cells(left: &str, right: &str) -> Ordering {
    left.to_lowercase()
        .cmp(&right.to_lowercase())
        .then_with(|| left.cmp(right))
}
