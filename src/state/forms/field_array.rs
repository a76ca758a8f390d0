//! Variable-length lists of sub-records
//!
//! Every row carries a stable [`Uuid`]. Inserting or removing a row shifts
//! the registry entries of the rows behind it, so each row keeps its own
//! touched/dirty/error state under its new index.

use super::error::TrackerError;
use super::field::FieldEntry;
use super::form_state::FormTracker;
use super::path::FieldPath;
use super::validation::FieldRules;
use super::value::FormValue;
use super::watch::ChangeKind;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Bookkeeping for one array field
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldArrayState {
    pub ids: Vec<Uuid>,
    /// Rules registered for every row, keyed by path relative to the row
    pub item_rules: Vec<(FieldPath, FieldRules)>,
}

/// One row of a field array, as seen by the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldArrayItem {
    pub id: Uuid,
    pub index: usize,
    pub value: FormValue,
}

/// Handle to an array field, borrowed from the tracker
pub struct FieldArray<'a> {
    tracker: &'a mut FormTracker,
    path: FieldPath,
}

impl FormTracker {
    /// Array operations for the field at `path`
    ///
    /// An absent value is treated as an empty array.
    pub fn field_array(&mut self, path: &str) -> Result<FieldArray<'_>, TrackerError> {
        self.ensure_mounted()?;
        let path = FieldPath::parse(path)?;
        match self.values.get(&path) {
            None | Some(FormValue::Null) | Some(FormValue::Array(_)) => {}
            Some(_) => return Err(TrackerError::NotAnArray(path.to_string())),
        }
        self.values.check_indexes(&path)?;
        if !self.arrays.contains_key(&path) {
            self.arrays.insert(path.clone(), FieldArrayState::default());
            self.sync_ids(&path, false);
        }
        Ok(FieldArray {
            tracker: self,
            path,
        })
    }

    fn array_len(&self, array: &FieldPath) -> usize {
        self.values
            .get(array)
            .and_then(FormValue::as_array)
            .map_or(0, Vec::len)
    }

    /// Bring the row ids of `array` in line with its current length
    fn sync_ids(&mut self, array: &FieldPath, fresh: bool) {
        let len = self.array_len(array);
        if let Some(state) = self.arrays.get_mut(array) {
            if fresh {
                state.ids.clear();
            }
            state.ids.truncate(len);
            while state.ids.len() < len {
                state.ids.push(Uuid::new_v4());
            }
        }
        for row in 0..len {
            self.ensure_row_entries(array, row);
        }
    }

    /// Resync every tracked array; `fresh` hands out new row identities
    pub(super) fn sync_array_ids(&mut self, fresh: bool) {
        let arrays: Vec<FieldPath> = self.arrays.keys().cloned().collect();
        for array in &arrays {
            self.sync_ids(array, fresh);
        }
    }

    /// Drop registry entries of rows that no longer exist
    pub(super) fn prune_array_rows(&mut self) {
        let arrays: Vec<FieldPath> = self.arrays.keys().cloned().collect();
        for array in &arrays {
            let len = self.array_len(array);
            self.rekey_rows(array, |row| (row < len).then_some(row));
        }
    }

    /// A whole array (or one of its ancestors) was overwritten
    pub(super) fn resync_arrays_under(&mut self, written: &FieldPath) {
        let arrays: Vec<FieldPath> = self
            .arrays
            .keys()
            .filter(|array| array.starts_with(written))
            .cloned()
            .collect();
        for array in &arrays {
            let len = self.array_len(array);
            self.rekey_rows(array, |row| (row < len).then_some(row));
            self.sync_ids(array, false);
        }
    }

    /// Register template rules and plain entries for the leaves of one row
    fn ensure_row_entries(&mut self, array: &FieldPath, row: usize) {
        let row_path = array.index(row);
        let templates = self
            .arrays
            .get(array)
            .map(|state| state.item_rules.clone())
            .unwrap_or_default();

        let mut wanted: Vec<(FieldPath, FieldRules)> = templates
            .into_iter()
            .map(|(relative, rules)| (row_path.join(&relative), rules))
            .collect();
        if let Some(row_value) = self.values.get(&row_path) {
            for (relative, _) in row_value.leaves() {
                let path = row_path.join(&relative);
                if !wanted.iter().any(|(p, _)| *p == path) {
                    wanted.push((path, FieldRules::new()));
                }
            }
        }

        for (path, rules) in wanted {
            if !self.fields.contains_key(&path) {
                let mut entry = FieldEntry::new(rules);
                entry.state.disabled = entry.rules.is_disabled(&self.values);
                entry.state.dirty = self.values.get(&path) != self.defaults.get(&path);
                self.fields.insert(path, entry);
            }
        }
    }

    /// Move every entry below `array` from row `i` to row `map(i)`, dropping it on `None`
    ///
    /// Moved entries get fresh tokens so that in-flight validations keyed by
    /// their old path are discarded.
    fn rekey_rows<F>(&mut self, array: &FieldPath, map: F)
    where
        F: Fn(usize) -> Option<usize>,
    {
        let rows: Vec<(FieldPath, usize)> = self
            .fields
            .keys()
            .filter_map(|path| path.array_index_under(array).map(|row| (path.clone(), row)))
            .collect();

        let mut moved = BTreeMap::new();
        for (path, row) in rows {
            let Some(entry) = self.fields.remove(&path) else {
                continue;
            };
            match map(row) {
                Some(target) if target == row => {
                    self.fields.insert(path, entry);
                }
                Some(target) => {
                    moved.insert(path.with_array_index(array, target), entry);
                }
                None => tracing::debug!("Dropping field {path}"),
            }
        }
        for (path, mut entry) in moved {
            self.next_token += 1;
            entry.token = self.next_token;
            entry.state.validating = false;
            self.fields.insert(path, entry);
        }

        // Nested arrays live under rows too
        let nested: Vec<(FieldPath, usize)> = self
            .arrays
            .keys()
            .filter_map(|path| path.array_index_under(array).map(|row| (path.clone(), row)))
            .collect();
        let mut moved_arrays = Vec::new();
        for (path, row) in nested {
            if let Some(state) = self.arrays.remove(&path) {
                if let Some(target) = map(row) {
                    moved_arrays.push((path.with_array_index(array, target), state));
                }
            }
        }
        self.arrays.extend(moved_arrays);
    }

    /// Whether `array` differs from its default as a whole
    ///
    /// Catches removed default rows, which leave no field entry behind to
    /// carry a dirty flag. An absent array equals an empty one.
    pub(super) fn array_dirty(&self, array: &FieldPath) -> bool {
        fn rows<'v>(root: &'v FormValue, array: &FieldPath) -> &'v [FormValue] {
            root.get(array)
                .and_then(FormValue::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
        }
        rows(&self.values, array) != rows(&self.defaults, array)
    }

    /// Common tail of every array mutation
    fn finish_array_change(&mut self, array: &FieldPath, kind: ChangeKind) {
        self.recompute_dirty_under(array);
        self.refresh_disabled();
        self.version += 1;
        self.notify(Some(array.clone()), kind);
    }
}

impl FieldArray<'_> {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.tracker.array_len(&self.path)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in order, with their stable ids
    pub fn fields(&self) -> Vec<FieldArrayItem> {
        let ids = self
            .tracker
            .arrays
            .get(&self.path)
            .map(|state| state.ids.as_slice())
            .unwrap_or_default();
        self.tracker
            .values
            .get(&self.path)
            .and_then(FormValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .zip(ids)
                    .enumerate()
                    .map(|(index, (value, id))| FieldArrayItem {
                        id: *id,
                        index,
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.tracker
            .arrays
            .get(&self.path)
            .map(|state| state.ids.clone())
            .unwrap_or_default()
    }

    /// Rules applied to `relative` in every current and future row
    pub fn set_item_rules(&mut self, relative: &str, rules: FieldRules) -> Result<(), TrackerError> {
        self.tracker.ensure_mounted()?;
        let relative = FieldPath::parse(relative)?;
        if let Some(state) = self.tracker.arrays.get_mut(&self.path) {
            state.item_rules.retain(|(p, _)| *p != relative);
            state.item_rules.push((relative.clone(), rules.clone()));
        }
        for row in 0..self.len() {
            let path = self.path.index(row).join(&relative);
            self.tracker.register(&path.to_string(), rules.clone())?;
        }
        Ok(())
    }

    pub fn append(&mut self, value: impl Into<FormValue>) -> Result<Uuid, TrackerError> {
        let len = self.len();
        self.insert_row(len, value.into(), ChangeKind::ArrayAppend)
    }

    pub fn prepend(&mut self, value: impl Into<FormValue>) -> Result<Uuid, TrackerError> {
        self.insert_row(0, value.into(), ChangeKind::ArrayInsert)
    }

    /// Insert before `index`; `index == len` appends
    pub fn insert(&mut self, index: usize, value: impl Into<FormValue>) -> Result<Uuid, TrackerError> {
        self.insert_row(index, value.into(), ChangeKind::ArrayInsert)
    }

    fn insert_row(&mut self, index: usize, value: FormValue, kind: ChangeKind) -> Result<Uuid, TrackerError> {
        self.tracker.ensure_editable()?;
        let len = self.len();
        if index > len {
            return Err(TrackerError::IndexOutOfRange {
                path: self.path.to_string(),
                index,
                len,
            });
        }

        let tracker = &mut *self.tracker;
        tracker.rekey_rows(&self.path, |row| Some(if row >= index { row + 1 } else { row }));

        let mut items = tracker
            .values
            .get(&self.path)
            .and_then(FormValue::as_array)
            .cloned()
            .unwrap_or_default();
        items.insert(index, value);
        tracker.values.set(&self.path, FormValue::Array(items))?;

        let id = Uuid::new_v4();
        if let Some(state) = tracker.arrays.get_mut(&self.path) {
            state.ids.insert(index, id);
        }
        tracker.ensure_row_entries(&self.path, index);

        tracing::debug!("Inserted row {index} into {} ({id})", self.path);
        tracker.finish_array_change(&self.path, kind);
        Ok(id)
    }

    /// Remove the row at `index` and its field state
    pub fn remove(&mut self, index: usize) -> Result<FormValue, TrackerError> {
        self.tracker.ensure_editable()?;
        let len = self.len();
        if index >= len {
            return Err(TrackerError::IndexOutOfRange {
                path: self.path.to_string(),
                index,
                len,
            });
        }

        let tracker = &mut *self.tracker;
        tracker.rekey_rows(&self.path, |row| match row.cmp(&index) {
            std::cmp::Ordering::Less => Some(row),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(row - 1),
        });

        let mut items = tracker
            .values
            .get(&self.path)
            .and_then(FormValue::as_array)
            .cloned()
            .unwrap_or_default();
        let removed = items.remove(index);
        tracker.values.set(&self.path, FormValue::Array(items))?;

        if let Some(state) = tracker.arrays.get_mut(&self.path) {
            if index < state.ids.len() {
                state.ids.remove(index);
            }
        }

        tracing::debug!("Removed row {index} from {}", self.path);
        tracker.finish_array_change(&self.path, ChangeKind::ArrayRemove);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::state::forms::error::FieldError;
    use crate::state::forms::form_state::SetValueOptions;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn phone(number: &str) -> FormValue {
        FormValue::object().with("number", number)
    }

    fn tracker() -> FormTracker {
        FormTracker::new(
            TrackerConfig::default(),
            FormValue::from(json!({ "username": "Batman", "phone": [{ "number": "" }] })),
        )
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn test_existing_rows_get_ids_and_entries() {
        let mut tracker = tracker();
        let array = tracker.field_array("phone").unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.ids().len(), 1);
        assert!(tracker.is_registered("phone.0.number"));
    }

    #[test]
    fn test_append_then_remove_restores_array() {
        let mut tracker = tracker();
        tracker.field_array("phone").unwrap();
        tracker.change("phone.0.number", "555-0100").unwrap();
        let before = tracker.get_values().clone();

        let mut array = tracker.field_array("phone").unwrap();
        let first_id = array.ids()[0];
        array.append(phone("555-0199")).unwrap();
        assert_eq!(array.len(), 2);
        assert!(tracker.is_registered("phone.1.number"));

        let mut array = tracker.field_array("phone").unwrap();
        let removed = array.remove(1).unwrap();
        assert_eq!(removed, phone("555-0199"));
        assert_eq!(array.len(), 1);
        assert_eq!(array.ids(), vec![first_id]);

        assert_eq!(tracker.get_values(), &before);
        assert!(!tracker.is_registered("phone.1.number"));
    }

    #[test]
    fn test_remove_keeps_sibling_state() {
        let mut tracker = tracker();
        let mut array = tracker.field_array("phone").unwrap();
        array
            .set_item_rules("number", FieldRules::new().required("Phone number is required"))
            .unwrap();
        array.append(phone("555-0101")).unwrap();
        array.append(phone("")).unwrap();
        let ids = array.ids();

        tracker.blur("phone.1.number").unwrap();
        tracker.begin_validate_field("phone.2.number").unwrap();

        tracker.field_array("phone").unwrap().remove(0).unwrap();

        let touched = tracker.field("phone.0.number").unwrap();
        assert_eq!(touched.value, FormValue::from("555-0101"));
        assert!(touched.state.touched);

        let failing = tracker.field("phone.1.number").unwrap();
        assert!(matches!(failing.state.error, Some(FieldError::Required { .. })));
        assert!(!tracker.is_registered("phone.2.number"));

        assert_eq!(tracker.field_array("phone").unwrap().ids(), ids[1..].to_vec());
    }

    #[test]
    fn test_insert_shifts_rows() {
        let mut tracker = tracker();
        tracker.field_array("phone").unwrap();
        tracker.change("phone.0.number", "555-0100").unwrap();
        tracker.blur("phone.0.number").unwrap();

        let mut array = tracker.field_array("phone").unwrap();
        array.prepend(phone("555-0000")).unwrap();
        let items = array.fields();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].value, phone("555-0000"));
        assert_eq!(items[1].index, 1);

        assert!(tracker.field("phone.1.number").unwrap().state.touched);
        assert!(!tracker.field("phone.0.number").unwrap().state.touched);
    }

    #[test]
    fn test_template_rules_apply_to_new_rows() {
        let mut tracker = tracker();
        let mut array = tracker.field_array("phone").unwrap();
        array
            .set_item_rules("number", FieldRules::new().required("Phone number is required"))
            .unwrap();
        array.append(phone("")).unwrap();
        tracker.begin_validate_field("phone.1.number").unwrap();
        assert!(!tracker.is_valid());
    }

    #[test]
    fn test_out_of_range() {
        let mut tracker = tracker();
        let mut array = tracker.field_array("phone").unwrap();
        assert_eq!(
            array.insert(5, phone("")).unwrap_err(),
            TrackerError::IndexOutOfRange {
                path: "phone".to_string(),
                index: 5,
                len: 1,
            }
        );
        assert!(matches!(array.remove(1), Err(TrackerError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_not_an_array() {
        let mut tracker = tracker();
        assert!(matches!(
            tracker.field_array("username"),
            Err(TrackerError::NotAnArray(_))
        ));
    }

    #[test]
    fn test_absent_array_starts_empty() {
        let mut tracker = tracker();
        let mut array = tracker.field_array("emails").unwrap();
        assert!(array.is_empty());
        array.append("bruce@wayne.com").unwrap();
        assert_eq!(
            tracker.get_value("emails.0").unwrap(),
            Some(&FormValue::from("bruce@wayne.com"))
        );
    }

    #[test]
    fn test_array_change_marks_dirty_and_reset_prunes() {
        let mut tracker = tracker();
        tracker.field_array("phone").unwrap().append(phone("555")).unwrap();
        assert!(tracker.is_dirty());

        tracker.reset(None).unwrap();
        assert!(!tracker.is_dirty());
        assert_eq!(tracker.field_array("phone").unwrap().len(), 1);
        assert!(!tracker.is_registered("phone.1.number"));
    }

    #[test]
    fn test_removing_a_default_row_is_dirty() {
        let mut tracker = tracker();
        tracker.field_array("phone").unwrap().remove(0).unwrap();
        assert_eq!(tracker.get_value("phone").unwrap(), Some(&FormValue::Array(vec![])));
        assert!(tracker.is_dirty());
        assert!(tracker.snapshot().is_dirty);

        tracker.field_array("phone").unwrap().append(phone("")).unwrap();
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_empty_absent_array_is_clean() {
        let mut tracker = tracker();
        let mut array = tracker.field_array("emails").unwrap();
        array.append("bruce@wayne.com").unwrap();
        array.remove(0).unwrap();
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_field_array_rejects_index_past_the_end() {
        let mut tracker = tracker();
        assert!(matches!(
            tracker.field_array("phone.4.extensions"),
            Err(TrackerError::IndexOutOfRange { index: 4, len: 1, .. })
        ));
    }

    #[test]
    fn test_set_value_on_array_resyncs_ids() {
        let mut tracker = tracker();
        tracker.field_array("phone").unwrap();
        tracker
            .set_value(
                "phone",
                FormValue::from(vec![phone("1"), phone("2"), phone("3")]),
                SetValueOptions::default(),
            )
            .unwrap();
        let array = tracker.field_array("phone").unwrap();
        assert_eq!(array.ids().len(), 3);
        assert!(tracker.is_registered("phone.2.number"));
        assert_eq!(tracker.errors().get(&path("phone.2.number")), None);
    }

    #[test]
    fn test_array_ops_notify_watchers() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut tracker = tracker();
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&kinds);
        tracker.watch(move |_, event| sink.borrow_mut().push(event.kind));

        let mut array = tracker.field_array("phone").unwrap();
        array.append(phone("1")).unwrap();
        array.insert(0, phone("0")).unwrap();
        array.remove(2).unwrap();

        assert_eq!(
            *kinds.borrow(),
            vec![ChangeKind::ArrayAppend, ChangeKind::ArrayInsert, ChangeKind::ArrayRemove]
        );
    }
}
