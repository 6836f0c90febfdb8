use crate::input::Action;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TagStage {
    Keys,
    Values { key: String, values: Vec<String> },
    Custom { key: String, buffer: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TagEffect {
    None,
    Apply { key: String, value: String },
    Remove(String),
    ClearAll,
    Close,
}

/// Picker state for the tag filter overlay: choose a key, then one of
/// the values seen on the loaded page or a typed substring.
#[derive(Debug, Clone)]
pub struct TagPicker {
    keys: Vec<String>,
    available: BTreeMap<String, BTreeSet<String>>,
    stage: TagStage,
    cursor: usize,
}

impl TagPicker {
    pub fn new(available: &BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            keys: available.keys().cloned().collect(),
            available: available.clone(),
            stage: TagStage::Keys,
            cursor: 0,
        }
    }

    pub fn stage(&self) -> &TagStage {
        &self.stage
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn accepts_text(&self) -> bool {
        matches!(self.stage, TagStage::Custom { .. })
    }

    pub fn handle(&mut self, action: Action) -> TagEffect {
        match &mut self.stage {
            TagStage::Keys => self.handle_keys(action),
            TagStage::Values { key, values } => {
                let key = key.clone();
                let len = values.len();
                match action {
                    Action::Down => self.move_cursor(1, len),
                    Action::Up => self.move_cursor(-1, len),
                    Action::Select => match values.get(self.cursor) {
                        Some(value) => TagEffect::Apply {
                            key,
                            value: value.clone(),
                        },
                        None => TagEffect::None,
                    },
                    Action::CustomTagValue => {
                        self.stage = TagStage::Custom {
                            key,
                            buffer: String::new(),
                        };
                        TagEffect::None
                    }
                    Action::Back => {
                        self.cursor = self.keys.iter().position(|k| *k == key).unwrap_or(0);
                        self.stage = TagStage::Keys;
                        TagEffect::None
                    }
                    _ => TagEffect::None,
                }
            }
            TagStage::Custom { key, buffer } => match action {
                Action::InputChar(c) => {
                    buffer.push(c);
                    TagEffect::None
                }
                Action::Backspace => {
                    buffer.pop();
                    TagEffect::None
                }
                Action::SubmitInput if !buffer.trim().is_empty() => TagEffect::Apply {
                    key: key.clone(),
                    value: buffer.trim().to_string(),
                },
                Action::CancelInput => {
                    let key = key.clone();
                    self.open_values(key);
                    TagEffect::None
                }
                _ => TagEffect::None,
            },
        }
    }

    fn handle_keys(&mut self, action: Action) -> TagEffect {
        let len = self.keys.len();
        match action {
            Action::Down => self.move_cursor(1, len),
            Action::Up => self.move_cursor(-1, len),
            Action::Select => match self.keys.get(self.cursor).cloned() {
                Some(key) => {
                    self.open_values(key);
                    TagEffect::None
                }
                None => TagEffect::None,
            },
            Action::RemoveTagFilter => match self.keys.get(self.cursor) {
                Some(key) => TagEffect::Remove(key.clone()),
                None => TagEffect::None,
            },
            Action::ClearTagFilters => TagEffect::ClearAll,
            Action::Back => TagEffect::Close,
            _ => TagEffect::None,
        }
    }

    fn open_values(&mut self, key: String) {
        let values = self
            .available
            .get(&key)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        self.stage = TagStage::Values { key, values };
        self.cursor = 0;
    }

    fn move_cursor(&mut self, delta: isize, len: usize) -> TagEffect {
        if len == 0 {
            self.cursor = 0;
        } else {
            self.cursor = self.cursor.saturating_add_signed(delta).min(len - 1);
        }
        TagEffect::None
    }
}

#[cfg(test)]
mod tests {
    use super::{TagEffect, TagPicker, TagStage};
    use crate::input::Action;
    use std::collections::{BTreeMap, BTreeSet};

    fn available() -> BTreeMap<String, BTreeSet<String>> {
        let mut map = BTreeMap::new();
        map.insert(
            "env".to_string(),
            ["staging", "prod"].into_iter().map(String::from).collect(),
        );
        map.insert(
            "team".to_string(),
            ["x"].into_iter().map(String::from).collect(),
        );
        map
    }

    #[test]
    fn selecting_key_then_value_applies_filter() {
        let mut picker = TagPicker::new(&available());
        assert_eq!(picker.handle(Action::Select), TagEffect::None);
        assert!(matches!(picker.stage(), TagStage::Values { key, .. } if key == "env"));

        picker.handle(Action::Down);
        assert_eq!(
            picker.handle(Action::Select),
            TagEffect::Apply {
                key: "env".to_string(),
                value: "staging".to_string()
            }
        );
    }

    #[test]
    fn custom_value_is_typed() {
        let mut picker = TagPicker::new(&available());
        picker.handle(Action::Down);
        picker.handle(Action::Select);
        picker.handle(Action::CustomTagValue);
        assert!(picker.accepts_text());
        for c in "dev".chars() {
            picker.handle(Action::InputChar(c));
        }
        assert_eq!(
            picker.handle(Action::SubmitInput),
            TagEffect::Apply {
                key: "team".to_string(),
                value: "dev".to_string()
            }
        );
    }

    #[test]
    fn back_from_values_returns_to_same_key() {
        let mut picker = TagPicker::new(&available());
        picker.handle(Action::Down);
        picker.handle(Action::Select);
        picker.handle(Action::Back);
        assert_eq!(picker.stage(), &TagStage::Keys);
        assert_eq!(picker.cursor(), 1);
        assert_eq!(picker.handle(Action::Back), TagEffect::Close);
    }

    #[test]
    fn remove_and_clear_are_reported() {
        let mut picker = TagPicker::new(&available());
        assert_eq!(
            picker.handle(Action::RemoveTagFilter),
            TagEffect::Remove("env".to_string())
        );
        assert_eq!(picker.handle(Action::ClearTagFilters), TagEffect::ClearAll);
    }
}
