use crate::iso8211::Record;

/// Records keyed by an integer identifier.
///
/// Appending is cheap and leaves the index unsorted; the first lookup after a
/// change sorts it by key, later lookups are binary searches.
///
/// ```
/// use gdalvec::iso8211::Record;
/// use gdalvec::s57::RecordIndex;
///
/// let mut index = RecordIndex::new();
/// for key in [5, 1, 3] {
///     index.add_record(key, Record::default());
/// }
/// assert_eq!(index.get_key_by_index(0), Some(1));
/// assert!(index.find_record(3).is_some());
/// assert!(index.find_record(2).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    records: Vec<(i32, Record)>,
    sorted: bool,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `record` under `key`.
    pub fn add_record(&mut self, key: i32, record: Record) {
        self.records.push((key, record));
        self.sorted = false;
    }

    /// Sort by key if records were added since the last sort.
    pub fn sort(&mut self) {
        if !self.sorted {
            self.records.sort_by_key(|(key, _)| *key);
            self.sorted = true;
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn find_record(&mut self, key: i32) -> Option<&Record> {
        self.sort();
        self.lookup(key)
    }

    /// Find a record without sorting. Falls back to a linear scan when the
    /// index is not sorted.
    pub fn lookup(&self, key: i32) -> Option<&Record> {
        if self.sorted {
            self.records
                .binary_search_by_key(&key, |(k, _)| *k)
                .ok()
                .map(|i| &self.records[i].1)
        } else {
            self.records.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
        }
    }

    /// Record at position `idx` in key order.
    pub fn get_by_index(&mut self, idx: usize) -> Option<&Record> {
        self.sort();
        self.records.get(idx).map(|(_, r)| r)
    }

    pub fn get_key_by_index(&mut self, idx: usize) -> Option<i32> {
        self.sort();
        self.records.get(idx).map(|(k, _)| *k)
    }

    /// Record at position `idx` in the current order, which is key order
    /// unless records were added since the last sort.
    pub fn record_at(&self, idx: usize) -> Option<&Record> {
        self.records.get(idx).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&mut self) -> impl Iterator<Item = (i32, &Record)> {
        self.sort();
        self.records.iter().map(|(k, r)| (*k, r))
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.sorted = false;
    }
}
