use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

pub const TAG_DELIMITER: &str = ";";

/// Ordered, duplicate-free tag list as edited in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits a URL filter value. Entries are kept exactly as written.
    pub fn parse(serialized: &str) -> Vec<String> {
        if serialized.is_empty() {
            return Vec::new();
        }
        serialized
            .split(TAG_DELIMITER)
            .map(str::to_string)
            .collect()
    }

    pub fn from_serialized(serialized: &str) -> Self {
        Self {
            tags: Self::parse(serialized),
        }
    }

    /// Input containing the delimiter is added as separate tags so the
    /// serialized filter parses back to the same list.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let mut added = false;
        for part in tag.split(TAG_DELIMITER) {
            let part = part.trim();
            if part.is_empty() || self.contains(part) {
                continue;
            }
            self.tags.push(part.to_string());
            added = true;
        }
        added
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        self.tags.len() != before
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.tags.is_empty();
        self.tags.clear();
        changed
    }

    pub fn set_tags(&mut self, serialized: &str) -> bool {
        let parsed = Self::parse(serialized);
        if parsed == self.tags {
            return false;
        }
        self.tags = parsed;
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn serialize(&self) -> String {
        self.tags.join(TAG_DELIMITER)
    }
}

/// Couples a [`TagSet`] with the `tag` URL parameter in both directions.
pub struct TagFilterBinding {
    tags: Mutex<TagSet>,
    filter: watch::Sender<String>,
}

impl TagFilterBinding {
    pub fn new(initial_filter: &str) -> Self {
        let tags = TagSet::from_serialized(initial_filter);
        let (filter, _) = watch::channel(tags.serialize());
        Self {
            tags: Mutex::new(tags),
            filter,
        }
    }

    pub fn add_tag(&self, tag: &str) -> bool {
        self.edit(|tags| tags.add_tag(tag))
    }

    pub fn remove_tag(&self, tag: &str) -> bool {
        self.edit(|tags| tags.remove_tag(tag))
    }

    pub fn clear(&self) -> bool {
        self.edit(TagSet::clear)
    }

    /// Applies a filter string coming from the URL side.
    pub fn set_filter(&self, serialized: &str) -> bool {
        self.edit(|tags| tags.set_tags(serialized))
    }

    pub fn tags(&self) -> Vec<String> {
        self.lock().tags().to_vec()
    }

    pub fn filter(&self) -> String {
        self.filter.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.filter.subscribe()
    }

    fn edit(&self, change: impl FnOnce(&mut TagSet) -> bool) -> bool {
        let serialized = {
            let mut tags = self.lock();
            if !change(&mut tags) {
                return false;
            }
            tags.serialize()
        };
        self.filter.send_if_modified(|current| {
            if *current == serialized {
                return false;
            }
            debug!(filter = %serialized, "tag filter changed");
            *current = serialized;
            true
        })
    }

    fn lock(&self) -> MutexGuard<'_, TagSet> {
        self.tags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{TagFilterBinding, TagSet};

    #[test]
    fn add_tag_ignores_duplicates_and_blanks() {
        let mut set = TagSet::new();
        for tag in ["urgent", "infra", "urgent", " ", "db", "infra"] {
            set.add_tag(tag);
        }
        assert_eq!(set.tags(), ["urgent", "infra", "db"]);
    }

    #[test]
    fn delimiter_inside_tag_is_split() {
        let mut set = TagSet::new();
        assert!(set.add_tag("a;b"));
        assert!(!set.add_tag("a"));
        assert_eq!(set.tags(), ["a", "b"]);

        let restored = TagSet::from_serialized(&set.serialize());
        assert_eq!(restored, set);
    }

    #[test]
    fn remove_tag_trims_like_add_tag() {
        let mut set = TagSet::new();
        set.add_tag(" urgent ");
        assert!(set.remove_tag(" urgent "));
        assert!(set.is_empty());
    }

    #[test]
    fn serialized_form_round_trips() {
        let mut set = TagSet::new();
        set.add_tag("urgent");
        set.add_tag("infra");
        assert_eq!(set.serialize(), "urgent;infra");
        assert_eq!(TagSet::parse("urgent;infra"), ["urgent", "infra"]);

        assert!(set.set_tags(""));
        assert!(set.is_empty());

        let passthrough = "a;b;a";
        assert_eq!(TagSet::from_serialized(passthrough).serialize(), passthrough);
    }

    #[test]
    fn binding_publishes_list_changes_to_filter() {
        let binding = TagFilterBinding::new("");
        let mut filter = binding.subscribe();

        assert!(binding.add_tag("urgent"));
        assert!(binding.add_tag("infra"));
        assert!(filter.has_changed().expect("sender alive"));
        assert_eq!(*filter.borrow_and_update(), "urgent;infra");

        assert!(!binding.add_tag("urgent"));
        assert!(!filter.has_changed().expect("sender alive"));
    }

    #[test]
    fn binding_applies_url_changes_without_echo() {
        let binding = TagFilterBinding::new("urgent");
        let mut filter = binding.subscribe();
        filter.borrow_and_update();

        assert!(!binding.set_filter("urgent"));
        assert!(!filter.has_changed().expect("sender alive"));

        assert!(binding.set_filter("urgent;db"));
        assert_eq!(binding.tags(), ["urgent", "db"]);
        assert_eq!(*filter.borrow_and_update(), "urgent;db");

        assert!(binding.clear());
        assert_eq!(binding.filter(), "");
    }
}
